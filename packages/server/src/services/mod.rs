pub mod attachment;
pub mod exchange;
pub mod records;
pub mod storage;
pub mod turn;
