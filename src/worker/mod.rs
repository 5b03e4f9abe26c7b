//! Background workers

pub mod profit_checker;

pub use profit_checker::ProfitChecker;
