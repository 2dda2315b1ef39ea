pub mod state;
pub mod utils;
