pub mod config;
pub mod contracts;
pub mod db;
pub mod publisher;
pub mod reader;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    ChequePaymentRequest, CreateOrderRequest, CreateOrderResponse, ObligationView,
    OrderHistoryResponse, OrderView, PaymentRequest, PaymentStatusBatchRequest,
    PaymentStatusBatchResponse, PaymentStatusQuery, PaymentStatusRow, RegisterObligationRequest,
    STATUS_CHANNEL, UpdateChequeStatusRequest, UpdateChequeStatusResponse, snapshot_key,
};
pub use db::connect_database;
pub use publisher::RedisStatusPublisher;
pub use reader::{RedisSnapshotSource, SnapshotRead, SnapshotReader, SnapshotSource};
pub use redis_bus::RedisBus;
