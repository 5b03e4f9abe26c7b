//! Order lifecycle: sizing, placement and ledger bookkeeping

pub mod locks;
pub mod manager;

pub use locks::{KeyedLocks, PositionKey};
pub use manager::{
    realized_profit, OpenRequest, OrderManager, ProfitSnapshot, Sizing, StopLoss, TakeProfit,
};
