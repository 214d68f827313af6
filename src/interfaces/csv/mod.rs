pub mod command_reader;
pub mod summary_writer;
