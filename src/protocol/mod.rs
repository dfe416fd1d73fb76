//! # Protocol Module
//!
//! Line-oriented wire framing between the controller and the driver.
//! The format is whitespace-tokenized: integers and literals may be
//! split across lines, exactly like the original stream readers, so the
//! reader buffers one line at a time and hands out tokens.
//!
//! ## Framing
//!
//! - **Init**: `T M N V G K`, then three `M × F` matrices
//!   (`F = ⌈T/1800⌉`) of per-tag per-time-block delete / write / read
//!   sums. Acknowledged with `OK`.
//! - **Per tick**: `TIMESTAMP <t>` echo; delete ids; write triples with
//!   placement blocks in response; read pairs with per-head action
//!   strings and the completion list in response; the busy list; and on
//!   every 1800th tick the `GARBAGE COLLECTION` exchange.
//!
//! Every emit helper flushes, mirroring the original's per-section
//! flush points — the driver blocks on our output before it sends the
//! next section.
//!
//! Malformed input (EOF, a non-integer token, an unexpected literal, a
//! timestamp mismatch) is a fatal protocol violation.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::io::{self, BufRead, BufWriter, Write};

use thiserror::Error;
use tracing::info;

use crate::placement::Placement;
use crate::scheduler::HeadPlan;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Fatal framing violations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Underlying stream I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The driver closed the stream mid-exchange.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A token that should have been an integer was not.
    #[error("malformed integer token `{0}`")]
    MalformedInteger(String),

    /// A literal keyword was expected.
    #[error("expected token `{expected}`, found `{found}`")]
    UnexpectedToken { expected: String, found: String },

    /// A value outside its documented range.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// The driver's tick counter diverged from ours.
    #[error("timestamp mismatch: driver sent {received}, controller at {expected}")]
    TimestampMismatch { expected: u32, received: u32 },
}

// ------------------------------------------------------------------------------------------------
// Wire events
// ------------------------------------------------------------------------------------------------

/// The one-shot init parameters.
#[derive(Debug, Clone, Copy)]
pub struct InitParams {
    /// Event-bearing ticks (the run lasts `tick_count + 105`).
    pub tick_count: u32,
    /// Number of object tags.
    pub tag_count: u32,
    /// Number of disks.
    pub disk_count: u32,
    /// Cells per disk.
    pub disk_capacity: u32,
    /// Token budget per head per tick.
    pub token_budget: u32,
    /// Maximum GC swaps per disk per collection.
    pub gc_swap_limit: u32,
}

/// One incoming write event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub id: u32,
    pub size: u8,
    pub tag: u8,
}

/// One incoming read event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadEvent {
    pub request_id: u32,
    pub object_id: u32,
}

/// The pre-declared per-tag per-time-block activity sums.
///
/// All matrices are 1-based in both dimensions; row 0 and column 0 are
/// unused padding.
#[derive(Debug, Clone)]
pub struct FrequencyTables {
    pub delete: Vec<Vec<u64>>,
    pub write: Vec<Vec<u64>>,
    pub read: Vec<Vec<u64>>,
}

impl FrequencyTables {
    /// All-zero tables for `tag_count` tags over `block_count` blocks.
    pub fn zeroed(tag_count: usize, block_count: usize) -> Self {
        let matrix = vec![vec![0u64; block_count + 1]; tag_count + 1];
        Self {
            delete: matrix.clone(),
            write: matrix.clone(),
            read: matrix,
        }
    }

    /// Declared read volume of `tag` in `block`; zero off-table.
    pub fn read_frequency(&self, tag: u8, block: usize) -> u64 {
        self.read
            .get(tag as usize)
            .and_then(|row| row.get(block))
            .copied()
            .unwrap_or(0)
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Buffered whitespace-token reader over the driver stream.
pub struct EventReader<R> {
    input: R,
    tokens: VecDeque<String>,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            tokens: VecDeque::new(),
        }
    }

    fn next_token(&mut self) -> Result<String, ProtocolError> {
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return Ok(token);
            }
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
            self.tokens
                .extend(line.split_whitespace().map(str::to_owned));
        }
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| ProtocolError::MalformedInteger(token))
    }

    fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| ProtocolError::MalformedInteger(token))
    }

    fn expect(&mut self, literal: &str) -> Result<(), ProtocolError> {
        let token = self.next_token()?;
        if token == literal {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedToken {
                expected: literal.to_owned(),
                found: token,
            })
        }
    }

    /// Reads the init parameters and the three frequency matrices.
    pub fn read_init(&mut self) -> Result<(InitParams, FrequencyTables), ProtocolError> {
        let params = InitParams {
            tick_count: self.read_u32()?,
            tag_count: self.read_u32()?,
            disk_count: self.read_u32()?,
            disk_capacity: self.read_u32()?,
            token_budget: self.read_u32()?,
            gc_swap_limit: self.read_u32()?,
        };

        let tags = params.tag_count as usize;
        let blocks = params.tick_count.div_ceil(crate::gc::GC_PERIOD).max(1) as usize;
        let mut tables = FrequencyTables::zeroed(tags, blocks);
        for matrix in [&mut tables.delete, &mut tables.write, &mut tables.read] {
            for tag in 1..=tags {
                for block in 1..=blocks {
                    matrix[tag][block] = self.read_u64()?;
                }
            }
        }

        info!(
            tick_count = params.tick_count,
            tag_count = params.tag_count,
            disk_count = params.disk_count,
            disk_capacity = params.disk_capacity,
            token_budget = params.token_budget,
            gc_swap_limit = params.gc_swap_limit,
            "init received"
        );
        Ok((params, tables))
    }

    /// Reads `TIMESTAMP <t>` and returns the driver's tick.
    pub fn read_timestamp(&mut self) -> Result<u32, ProtocolError> {
        self.expect("TIMESTAMP")?;
        self.read_u32()
    }

    /// Reads the delete section: a count then that many object ids.
    pub fn read_delete_ids(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let count = self.read_u32()? as usize;
        (0..count).map(|_| self.read_u32()).collect()
    }

    /// Reads the write section: a count then `<id> <size> <tag>` lines.
    pub fn read_write_requests(&mut self) -> Result<Vec<WriteRequest>, ProtocolError> {
        let count = self.read_u32()? as usize;
        let mut requests = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.read_u32()?;
            let size = self.read_u32()?;
            let tag = self.read_u32()?;
            if !(1..=crate::disk::MAX_OBJECT_SIZE as u32).contains(&size) {
                return Err(ProtocolError::OutOfRange(format!(
                    "object {id} has size {size}"
                )));
            }
            requests.push(WriteRequest {
                id,
                size: size as u8,
                tag: tag as u8,
            });
        }
        Ok(requests)
    }

    /// Reads the read section: a count then `<req-id> <object-id>` lines.
    pub fn read_read_events(&mut self) -> Result<Vec<ReadEvent>, ProtocolError> {
        let count = self.read_u32()? as usize;
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(ReadEvent {
                request_id: self.read_u32()?,
                object_id: self.read_u32()?,
            });
        }
        Ok(events)
    }

    /// Reads the driver's `GARBAGE COLLECTION` announcement.
    pub fn read_gc_request(&mut self) -> Result<(), ProtocolError> {
        self.expect("GARBAGE")?;
        self.expect("COLLECTION")
    }
}

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

/// Buffered emitter for every driver-facing output form.
pub struct EventWriter<W: Write> {
    output: BufWriter<W>,
}

impl<W: Write> EventWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output: BufWriter::new(output),
        }
    }

    /// Acknowledges a successful init.
    pub fn ack_init(&mut self) -> Result<(), ProtocolError> {
        writeln!(self.output, "OK")?;
        self.output.flush()?;
        Ok(())
    }

    /// Echoes the aligned timestamp.
    pub fn echo_timestamp(&mut self, tick: u32) -> Result<(), ProtocolError> {
        writeln!(self.output, "TIMESTAMP {tick}")?;
        self.output.flush()?;
        Ok(())
    }

    /// Emits a request-id list: count, then one id per line, ascending.
    pub fn id_list(&mut self, ids: &[u32]) -> Result<(), ProtocolError> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        writeln!(self.output, "{}", sorted.len())?;
        for id in sorted {
            writeln!(self.output, "{id}")?;
        }
        self.output.flush()?;
        Ok(())
    }

    /// Emits the placement blocks for a write batch, in input order.
    pub fn placements(&mut self, placements: &[Placement]) -> Result<(), ProtocolError> {
        for placement in placements {
            writeln!(self.output, "{}", placement.object_id)?;
            for replica in &placement.replicas {
                write!(self.output, "{}", replica.disk)?;
                for block in 1..=placement.size {
                    write!(self.output, " {}", replica.position_of(block))?;
                }
                writeln!(self.output)?;
            }
        }
        self.output.flush()?;
        Ok(())
    }

    /// Emits one action string per head, disk-major.
    pub fn head_plans(&mut self, plans: &[[HeadPlan; 2]]) -> Result<(), ProtocolError> {
        for disk_plans in plans {
            for plan in disk_plans {
                writeln!(self.output, "{plan}")?;
            }
        }
        self.output.flush()?;
        Ok(())
    }

    /// Emits the GC block: the banner, then per disk a swap count and
    /// the `<from> <to>` pairs.
    pub fn gc_block(&mut self, swaps: &[Vec<(u32, u32)>]) -> Result<(), ProtocolError> {
        writeln!(self.output, "GARBAGE COLLECTION")?;
        for disk_swaps in swaps {
            writeln!(self.output, "{}", disk_swaps.len())?;
            for &(from, to) in disk_swaps {
                writeln!(self.output, "{from} {to}")?;
            }
        }
        self.output.flush()?;
        Ok(())
    }
}
