pub mod settlement_repair;

pub use settlement_repair::{RepairReport, SettlementRepairConfig, SettlementRepairWorker};
