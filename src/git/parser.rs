use crate::error::ParseError;
use crate::git::path::RepoPath;
use crate::model::record::{ChangeRecord, FileStatus, RecordSet};

/// How records are delimited in the status stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// `git status --porcelain -z`: NUL-terminated, paths verbatim,
    /// renames as `new\0old\0`
    Nul,
    /// `git status --porcelain`: newline-terminated, C-quoted paths,
    /// renames as `old -> new`
    Line,
}

impl Framing {
    fn detect(output: &[u8]) -> Self {
        if output.contains(&0) {
            Framing::Nul
        } else {
            Framing::Line
        }
    }

    fn terminator(self) -> u8 {
        match self {
            Framing::Nul => 0,
            Framing::Line => b'\n',
        }
    }
}

/// Terminated fields of the stream, with their byte offsets
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
    terminator: u8,
}

impl<'a> Iterator for Fields<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.data[start..];
        let len = rest
            .iter()
            .position(|b| *b == self.terminator)
            .unwrap_or(rest.len());
        self.pos = start + len + 1;
        Some((start, &rest[..len]))
    }
}

/// Parse porcelain v1 status output into a path-sorted record set
///
/// Accepts both `-z` and newline-terminated output. Unknown status characters
/// degrade to `FileStatus::Unknown`; structural damage fails the whole batch.
pub fn parse_status(output: &[u8]) -> Result<RecordSet, ParseError> {
    if output.is_empty() {
        return Ok(RecordSet::new());
    }

    let framing = Framing::detect(output);
    let terminator = framing.terminator();

    if output.last() != Some(&terminator) {
        let offset = output
            .iter()
            .rposition(|b| *b == terminator)
            .map_or(0, |i| i + 1);
        return Err(ParseError::Truncated { offset });
    }

    let mut fields = Fields {
        data: output,
        pos: 0,
        terminator,
    };
    let mut records = Vec::new();

    while let Some((offset, field)) = fields.next() {
        // blank lines and the `## branch` header from `-b`
        if field.is_empty() || field.starts_with(b"## ") {
            continue;
        }

        if field.len() < 4 {
            return Err(malformed(offset, "record too short"));
        }
        if field[2] != b' ' {
            return Err(malformed(offset + 2, "expected space after status code"));
        }

        let Some((index_status, worktree_status)) = classify(field[0], field[1]) else {
            continue;
        };
        let needs_origin = index_status.has_origin() || worktree_status.has_origin();
        let rest = &field[3..];

        let (path, previous_path) = match framing {
            Framing::Nul => {
                let previous = if needs_origin {
                    match fields.next() {
                        Some((_, origin)) if !origin.is_empty() => Some(RepoPath::from(origin)),
                        Some((at, _)) => return Err(malformed(at, "empty origin path")),
                        None => {
                            return Err(ParseError::Truncated {
                                offset: output.len(),
                            });
                        }
                    }
                } else {
                    None
                };
                (RepoPath::from(rest), previous)
            }
            Framing::Line => parse_line_paths(rest, offset + 3, needs_origin)?,
        };

        records.push(ChangeRecord {
            path,
            previous_path,
            index_status,
            worktree_status,
        });
    }

    RecordSet::from_records(records)
}

/// Render records back into `-z` porcelain form
pub fn write_status(records: &RecordSet) -> Vec<u8> {
    let mut out = Vec::new();

    for record in records {
        out.push(record.index_status.byte());
        out.push(record.worktree_status.byte());
        out.push(b' ');
        out.extend_from_slice(record.path.as_bytes());
        out.push(0);

        let has_origin = record.index_status.has_origin() || record.worktree_status.has_origin();
        if has_origin && let Some(previous) = &record.previous_path {
            out.extend_from_slice(previous.as_bytes());
            out.push(0);
        }
    }

    out
}

/// Map a status pair; `None` for ignored entries
fn classify(x: u8, y: u8) -> Option<(FileStatus, FileStatus)> {
    match (x, y) {
        (b'!', b'!') => None,
        (b'?', b'?') => Some((FileStatus::Untracked, FileStatus::Untracked)),
        (b'D', b'D')
        | (b'A', b'U')
        | (b'U', b'D')
        | (b'U', b'A')
        | (b'D', b'U')
        | (b'A', b'A')
        | (b'U', b'U') => Some((FileStatus::Conflicted, FileStatus::Conflicted)),
        _ => Some((FileStatus::from_code(x), FileStatus::from_code(y))),
    }
}

/// Paths of a newline-framed record; renames read `old -> new`
fn parse_line_paths(
    rest: &[u8],
    offset: usize,
    needs_origin: bool,
) -> Result<(RepoPath, Option<RepoPath>), ParseError> {
    let (first, used) = read_path(rest, offset, needs_origin)?;

    if !needs_origin {
        if used != rest.len() {
            return Err(malformed(offset + used, "trailing bytes after path"));
        }
        return Ok((first, None));
    }

    let Some(target) = rest[used..].strip_prefix(b" -> ") else {
        return Err(malformed(offset + used, "rename record without ' -> '"));
    };
    let target_offset = offset + used + 4;
    let (second, used) = read_path(target, target_offset, false)?;
    if used != target.len() {
        return Err(malformed(target_offset + used, "trailing bytes after path"));
    }

    Ok((second, Some(first)))
}

/// Read one path, quoted or bare, returning it and the bytes consumed
fn read_path(bytes: &[u8], offset: usize, stop_at_arrow: bool) -> Result<(RepoPath, usize), ParseError> {
    if bytes.first() == Some(&b'"') {
        return unquote(bytes, offset);
    }

    let len = if stop_at_arrow {
        bytes
            .windows(4)
            .position(|w| w == b" -> ")
            .ok_or_else(|| malformed(offset, "rename record without ' -> '"))?
    } else {
        bytes.len()
    };

    if len == 0 {
        return Err(malformed(offset, "empty path"));
    }
    Ok((RepoPath::from(&bytes[..len]), len))
}

/// Decode a C-style quoted path as emitted by git for unusual names
fn unquote(bytes: &[u8], offset: usize) -> Result<(RepoPath, usize), ParseError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                if out.is_empty() {
                    return Err(malformed(offset, "empty path"));
                }
                return Ok((RepoPath::from_bytes(out), i + 1));
            }
            b'\\' => {
                let escape = *bytes
                    .get(i + 1)
                    .ok_or_else(|| malformed(offset + i, "dangling escape"))?;
                let (byte, width) = match escape {
                    b'a' => (0x07, 2),
                    b'b' => (0x08, 2),
                    b't' => (b'\t', 2),
                    b'n' => (b'\n', 2),
                    b'v' => (0x0b, 2),
                    b'f' => (0x0c, 2),
                    b'r' => (b'\r', 2),
                    b'"' => (b'"', 2),
                    b'\\' => (b'\\', 2),
                    b'0'..=b'3' => (octal(bytes, i + 1).ok_or_else(|| malformed(offset + i, "bad octal escape"))?, 4),
                    _ => return Err(malformed(offset + i, "unknown escape")),
                };
                out.push(byte);
                i += width;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    Err(malformed(offset, "unterminated quoted path"))
}

fn octal(bytes: &[u8], start: usize) -> Option<u8> {
    let digits = bytes.get(start..start + 3)?;
    digits.iter().try_fold(0u8, |acc, d| match d {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(d - b'0'),
        _ => None,
    })
}

fn malformed(offset: usize, reason: &str) -> ParseError {
    ParseError::MalformedRecord {
        offset,
        reason: reason.to_string(),
    }
}
