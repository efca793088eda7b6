use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identity of a chunk: which file it came from and its position in that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    /// Position of the file in the sorted enumeration.
    pub file_index: usize,
    pub file: Arc<PathBuf>,
    /// Zero-based chunk index within the file.
    pub seq: u64,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file.display(), self.seq)
    }
}

#[derive(Debug, Clone)]
pub struct LogChunk {
    pub id: ChunkId,
    /// 1-based line number of `lines[0]` in the source file.
    pub first_line: u64,
    pub lines: Vec<String>,
}

impl LogChunk {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Number of chunks a file of `total_lines` lines splits into.
pub fn chunk_count(total_lines: u64, lines_per_chunk: u64) -> u64 {
    if lines_per_chunk == 0 {
        return 0;
    }
    total_lines.div_ceil(lines_per_chunk)
}

/// Accumulates the lines of one file and cuts them into chunks.
pub struct Chunker {
    file_index: usize,
    file: Arc<PathBuf>,
    lines_per_chunk: usize,
    next_seq: u64,
    next_line: u64,
    buf: Vec<String>,
}

impl Chunker {
    pub fn new(file_index: usize, file: Arc<PathBuf>, lines_per_chunk: usize) -> Self {
        let lines_per_chunk = lines_per_chunk.max(1);
        Self {
            file_index,
            file,
            lines_per_chunk,
            next_seq: 0,
            next_line: 1,
            buf: Vec::with_capacity(lines_per_chunk),
        }
    }

    /// Adds a line, returning a full chunk once `lines_per_chunk` lines are buffered.
    pub fn push(&mut self, line: String) -> Option<LogChunk> {
        self.buf.push(line);
        if self.buf.len() >= self.lines_per_chunk {
            Some(self.cut())
        } else {
            None
        }
    }

    /// The trailing partial chunk, if any lines are left.
    pub fn finish(mut self) -> Option<LogChunk> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.cut())
        }
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.next_seq
    }

    fn cut(&mut self) -> LogChunk {
        let lines = std::mem::replace(&mut self.buf, Vec::with_capacity(self.lines_per_chunk));
        let chunk = LogChunk {
            id: ChunkId {
                file_index: self.file_index,
                file: Arc::clone(&self.file),
                seq: self.next_seq,
            },
            first_line: self.next_line,
            lines,
        };
        self.next_seq += 1;
        self.next_line += chunk.lines.len() as u64;
        chunk
    }
}
