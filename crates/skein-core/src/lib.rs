pub mod backend;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod tokens;
pub mod uri;
