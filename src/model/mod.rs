pub mod control_tag;
pub mod raw_frame;
pub mod state_update;
pub mod turn_result;
pub mod survivor_state;
pub mod event_result;
pub mod message;
pub mod game_context;
pub mod ending;
