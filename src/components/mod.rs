pub mod history;
pub mod layers;
pub mod tools;
