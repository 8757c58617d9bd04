// Declarative command module
pub mod declarative;
