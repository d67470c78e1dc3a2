pub mod media;
pub mod settings;
