pub mod candle;
pub mod pool;
pub mod sync_state;
pub mod token;
pub mod swap_event;

pub use candle::{Candle, CandleStatus, Interval};
pub use pool::Pool;
pub use sync_state::SyncState;
pub use token::Token;
pub use swap_event::SwapEvent;
