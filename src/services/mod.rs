pub mod clock;
pub mod connection;
pub mod coordinator;
pub mod errors;
pub mod game_room;
pub mod presence;
pub mod public_queue;
pub mod temp_room;
pub mod timeout;
pub mod user_service;
