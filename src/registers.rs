//! Tag registers and the commands that update them.
//!
//! Each capture group owns two tags (start and end); determinization may
//! allocate extra overflow slots. A register cell stores the pair of offsets
//! recorded when its tag fired.

use core::cmp::Ordering;

/// Source of a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandSrc {
    /// Copy another register cell.
    Register(usize),
    /// Record the traversal's current position.
    CurrentPosition,
}

/// A single register update executed while crossing an arc or accepting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagMapCommand {
    pub dest: usize,
    pub src: CommandSrc,
}

impl TagMapCommand {
    pub fn new(dest: usize, src: CommandSrc) -> TagMapCommand {
        TagMapCommand { dest, src }
    }

    pub fn set_position(dest: usize) -> TagMapCommand {
        TagMapCommand {
            dest,
            src: CommandSrc::CurrentPosition,
        }
    }

    pub fn copy(dest: usize, src: usize) -> TagMapCommand {
        TagMapCommand {
            dest,
            src: CommandSrc::Register(src),
        }
    }
}

// Copies reading a register sort before the position-set writing it, so a
// renumbered command list never clobbers a cell before it is read.
impl Ord for TagMapCommand {
    fn cmp(&self, other: &TagMapCommand) -> Ordering {
        self.dest
            .cmp(&other.dest)
            .then_with(|| self.src.cmp(&other.src))
    }
}

impl PartialOrd for TagMapCommand {
    fn partial_cmp(&self, other: &TagMapCommand) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One register: the offsets captured for a tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegisterCell {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

/// The register file carried by every traversal instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Registers {
    cells: Vec<RegisterCell>,
}

impl Registers {
    pub fn new(count: usize) -> Registers {
        Registers {
            cells: vec![RegisterCell::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline(always)]
    pub fn cell(&self, index: usize) -> RegisterCell {
        self.cells[index]
    }

    pub fn set(&mut self, index: usize, start: Option<usize>, end: Option<usize>) {
        self.cells[index] = RegisterCell { start, end };
    }

    /// Reinitialize to `count` empty cells, keeping allocation.
    pub fn reset(&mut self, count: usize) {
        self.cells.clear();
        self.cells.resize(count, RegisterCell::default());
    }

    pub fn copy_from(&mut self, other: &Registers) {
        self.cells.clear();
        self.cells.extend_from_slice(&other.cells);
    }

    /// Run a command list at the given position. `start`/`end` are the
    /// offsets written by `CurrentPosition` sources.
    pub fn execute(&mut self, cmds: &[TagMapCommand], start: Option<usize>, end: Option<usize>) {
        for cmd in cmds {
            match cmd.src {
                CommandSrc::CurrentPosition => {
                    self.cells[cmd.dest] = RegisterCell { start, end };
                }
                CommandSrc::Register(src) => {
                    self.cells[cmd.dest] = self.cells[src];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_writes_position_and_copies() {
        let mut regs = Registers::new(3);
        regs.execute(&[TagMapCommand::set_position(1)], Some(4), Some(7));
        assert_eq!(regs.cell(1).start, Some(4));
        assert_eq!(regs.cell(1).end, Some(7));

        regs.execute(&[TagMapCommand::copy(2, 1)], None, None);
        assert_eq!(regs.cell(2).start, Some(4));
        assert_eq!(regs.cell(2).end, Some(7));
        assert_eq!(regs.cell(0), RegisterCell::default());
    }

    #[test]
    fn commands_sort_copies_before_position_sets() {
        let mut cmds = vec![
            TagMapCommand::set_position(2),
            TagMapCommand::copy(2, 5),
            TagMapCommand::set_position(0),
        ];
        cmds.sort();
        assert_eq!(cmds[0], TagMapCommand::set_position(0));
        assert_eq!(cmds[1], TagMapCommand::copy(2, 5));
        assert_eq!(cmds[2], TagMapCommand::set_position(2));
    }
}
