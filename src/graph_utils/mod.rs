pub mod interaction;
pub mod layout;
