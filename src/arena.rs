/*
 * Filename: /src/arena.rs
 * Project: corewars-vm
 *
 * MIT License
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of
 * this software and associated documentation files (the "Software"), to deal in
 * the Software without restriction, including without limitation the rights to
 * use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies
 * of the Software, and to permit persons to whom the Software is furnished to do
 * so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

pub mod arena_error;

use arena_error::{ArenaError, ArenaErrorKind};
use bitflags::bitflags;
use hexplay::HexViewBuilder;
use log::trace;

pub type ProcessId = u32;

bitflags! {
    /// kind of memory access recorded in the arena's access log.
    pub struct AccessKind: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// one recorded access to the arena, used for bot-on-bot forensics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub address: usize,
    pub kind: AccessKind,
    pub actor: Option<ProcessId>,
    pub previous_owner: Option<ProcessId>,
}

/// a named contiguous run of bytes, as emitted by the assembler and
/// placed into the arena by the loader.
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub start: usize,
    pub data: Vec<u8>,
}

/// a point-in-time dump of the arena, for post-mortem inspection.
pub struct CoreDump {
    pub bytes: Vec<u8>,
}

impl CoreDump {
    /// renders the dump as a hex view, grouped in 16-byte rows.
    pub fn render(&self) -> String {
        let view = HexViewBuilder::new(&self.bytes).row_width(16).finish();
        format!("{}", view)
    }
}

/// byte-addressable shared memory arena with owner tagging (4.A).
///
/// `read`/`write` always succeed: every address is folded `mod size()`
/// before indexing, so there is no out-of-range case to report. an
/// implementer who panics or errors on a large address has diverged.
pub struct Arena {
    size: usize,
    cells: Vec<u8>,
    owners: Vec<Option<ProcessId>>,
    current_process: Option<ProcessId>,
    access_log: Vec<AccessRecord>,
    max_log_entries: usize,
}

impl Arena {
    pub fn new(size: usize, max_log_entries: usize) -> Self {
        Arena {
            size,
            cells: vec![0u8; size],
            owners: vec![None; size],
            current_process: None,
            access_log: Vec::new(),
            max_log_entries,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn fold(&self, addr: usize) -> usize {
        addr % self.size
    }

    /// P1: arena.read(a) == arena.read(a mod N), always succeeds.
    pub fn read(&self, addr: usize) -> u8 {
        let a = self.fold(addr);
        trace!("arena read addr={:#x}", a);
        self.cells[a]
    }

    pub fn read_word_le(&self, addr: usize) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    /// writes a byte, re-tagging the cell's owner to the current process.
    /// owner change alone is the observable aggression signal; the write
    /// itself is never refused.
    pub fn write(&mut self, addr: usize, value: u8) {
        let a = self.fold(addr);
        let previous_owner = self.owners[a];
        self.cells[a] = value;
        self.owners[a] = self.current_process;
        trace!(
            "arena write addr={:#x} value={:#04x} owner={:?}",
            a,
            value,
            self.current_process
        );
        self.push_log(AccessRecord {
            address: a,
            kind: AccessKind::WRITE,
            actor: self.current_process,
            previous_owner,
        });
    }

    pub fn write_word_le(&mut self, addr: usize, value: u16) {
        self.write(addr, (value & 0xff) as u8);
        self.write(addr.wrapping_add(1), (value >> 8) as u8);
    }

    pub fn owner(&self, addr: usize) -> Option<ProcessId> {
        self.owners[self.fold(addr)]
    }

    /// scoped setter used by the interpreter to attribute the writes of
    /// the currently scheduled process.
    pub fn set_current_process(&mut self, pid: Option<ProcessId>) {
        self.current_process = pid;
    }

    fn push_log(&mut self, record: AccessRecord) {
        self.access_log.push(record);
        if self.access_log.len() > self.max_log_entries {
            let overflow = self.access_log.len() - self.max_log_entries;
            self.access_log.drain(0..overflow);
        }
    }

    pub fn get_access_log(&self) -> &[AccessRecord] {
        &self.access_log
    }

    pub fn clear_access_log(&mut self) {
        self.access_log.clear();
    }

    /// bulk read used by the external UI bridge for visualisation.
    pub fn snapshot_range(&self, start: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.read(start + i)).collect()
    }

    /// places a segment's bytes into the arena, tagging every written
    /// cell with `owner`. rejects a segment that would not fit in the
    /// arena even once, since silently wrapping a bot's own load would
    /// scramble its later instructions.
    pub fn load_segment(&mut self, segment: &Segment, owner: ProcessId) -> Result<(), ArenaError> {
        if segment.data.len() > self.size {
            return Err(ArenaError::new(
                ArenaErrorKind::SegmentTooLarge,
                format!("segment '{}' is {} bytes, arena holds {}", segment.name, segment.data.len(), self.size),
            ));
        }
        let previous = self.current_process;
        self.set_current_process(Some(owner));
        for (i, &byte) in segment.data.iter().enumerate() {
            self.write(segment.start + i, byte);
        }
        self.set_current_process(previous);
        Ok(())
    }

    pub fn core_dump(&self) -> CoreDump {
        CoreDump {
            bytes: self.cells.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_wrap_around() {
        let mut a = Arena::new(1024, 100);
        a.set_current_process(Some(1));
        a.write(1024 + 7, 0xff);
        assert_eq!(a.read(7), 0xff);
    }

    #[test]
    fn read_never_fails_far_out_of_range() {
        let a = Arena::new(16, 100);
        assert_eq!(a.read(usize::MAX), a.read(usize::MAX % 16));
    }

    #[test]
    fn write_updates_owner_only_on_write() {
        let mut a = Arena::new(16, 100);
        a.set_current_process(Some(1));
        a.write(4, 9);
        assert_eq!(a.owner(4), Some(1));
        let _ = a.read(4);
        assert_eq!(a.owner(4), Some(1));
        a.set_current_process(Some(2));
        a.write(4, 1);
        assert_eq!(a.owner(4), Some(2));
        assert_eq!(a.read(4), 1);
    }

    #[test]
    fn log_bounded_trims_oldest() {
        let mut a = Arena::new(16, 3);
        a.set_current_process(Some(1));
        for i in 0..10u8 {
            a.write(i as usize, i);
        }
        assert!(a.get_access_log().len() <= 3);
        assert_eq!(a.get_access_log().last().unwrap().address, 9);
    }
}
