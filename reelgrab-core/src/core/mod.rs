pub mod events;
pub mod filename;
pub mod format;
pub mod jobs;
pub mod process;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod sanitize;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;
