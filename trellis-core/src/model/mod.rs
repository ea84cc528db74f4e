pub mod participant;
pub mod room;
pub mod signaling;
