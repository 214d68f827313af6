use crate::application::report::GroupSummary;
use crate::error::Result;
use std::io::Write;

/// Writes group summaries as CSV with the header
/// `group,status,members,cycle,recipient,paid`.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summaries(&mut self, summaries: impl IntoIterator<Item = GroupSummary>) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
