use crate::domain::group::Frequency;
use crate::domain::identity::UserRef;
use crate::error::{EqubError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Create,
    Join,
    Start,
    Pay,
    Rollover,
}

/// One row of a command file: `op, group, user, amount, frequency`.
///
/// `group` is the group name and `user` the caller's email. `amount` and
/// `frequency` are only read for `create`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: CommandType,
    pub group: String,
    pub user: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub frequency: Option<Frequency>,
}

impl Command {
    pub fn caller(&self) -> Result<UserRef> {
        let email = self.user.trim();
        if email.is_empty() {
            return Err(EqubError::ValidationError(
                "command is missing the user column".to_string(),
            ));
        }
        Ok(UserRef::from_email(email))
    }
}

/// Reads commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Command>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EqubError::from))
    }
}
