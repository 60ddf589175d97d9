pub mod model;

pub use model::{
    MeterReading, MeterValuesRecord, Transaction, TransactionCost, TransactionStatus,
    TransactionStop,
};
