//! Region part kinds and the part flag-set.
//!
//! A region may consist of a base part and an auxiliary part. The auxiliary
//! part depends on the base part and cannot outlive it; the cascade lives in
//! `PartSet::with_dependents` so delete call sites never reimplement it.

use std::fmt;

/// One downloadable file kind belonging to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    /// The map data file. Every region has one.
    Base,
    /// Additional data layered on top of the base file.
    Auxiliary,
}

impl Part {
    /// All parts, `Base` first. Download order follows this.
    pub const ALL: [Part; 2] = [Part::Base, Part::Auxiliary];

    fn bit(self) -> u8 {
        match self {
            Part::Base => 0b01,
            Part::Auxiliary => 0b10,
        }
    }
}

/// Flag-set over the parts of a region.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PartSet(u8);

impl PartSet {
    pub const EMPTY: PartSet = PartSet(0);
    pub const BASE: PartSet = PartSet(0b01);
    pub const AUXILIARY: PartSet = PartSet(0b10);
    pub const ALL: PartSet = PartSet(0b11);

    pub fn from_part(part: Part) -> PartSet {
        PartSet(part.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, part: Part) -> bool {
        self.0 & part.bit() != 0
    }

    pub fn union(self, other: PartSet) -> PartSet {
        PartSet(self.0 | other.0)
    }

    pub fn subtract(self, other: PartSet) -> PartSet {
        PartSet(self.0 & !other.0)
    }

    pub fn intersect(self, other: PartSet) -> PartSet {
        PartSet(self.0 & other.0)
    }

    pub fn insert(&mut self, part: Part) {
        self.0 |= part.bit();
    }

    pub fn remove(&mut self, part: Part) {
        self.0 &= !part.bit();
    }

    /// Expands a delete set with the parts depending on the named ones:
    /// deleting `Base` always deletes `Auxiliary` as well.
    pub fn with_dependents(self) -> PartSet {
        if self.contains(Part::Base) {
            self.union(PartSet::AUXILIARY)
        } else {
            self
        }
    }

    /// Parts in this set, `Base` first.
    pub fn parts(self) -> impl Iterator<Item = Part> {
        Part::ALL.into_iter().filter(move |part| self.contains(*part))
    }
}

impl fmt::Debug for PartSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for part in self.parts() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            match part {
                Part::Base => f.write_str("base")?,
                Part::Auxiliary => f.write_str("aux")?,
            }
        }
        Ok(())
    }
}
