use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identity on the course radio channel.
///
/// The set is fixed per deployment. Both remote-control handhelds share
/// [`Identifier::RemoteControl`]; the protocol does not tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Identifier {
    Coordinator = 0,
    MarkA = 1,
    MarkB = 2,
    Windward = 3,
    Leeward = 4,
    RemoteControl = 5,
}

impl Identifier {
    pub const ALL: [Identifier; 6] = [
        Identifier::Coordinator,
        Identifier::MarkA,
        Identifier::MarkB,
        Identifier::Windward,
        Identifier::Leeward,
        Identifier::RemoteControl,
    ];

    /// The four course marks, in ordinal order.
    pub const MARKS: [Identifier; 4] = [
        Identifier::MarkA,
        Identifier::MarkB,
        Identifier::Windward,
        Identifier::Leeward,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn is_mark(self) -> bool {
        matches!(
            self,
            Identifier::MarkA | Identifier::MarkB | Identifier::Windward | Identifier::Leeward
        )
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Identifier::Coordinator => "coordinator",
            Identifier::MarkA => "mark-a",
            Identifier::MarkB => "mark-b",
            Identifier::Windward => "windward",
            Identifier::Leeward => "leeward",
            Identifier::RemoteControl => "remote",
        };
        write!(f, "{}({})", name, self.ordinal())
    }
}
