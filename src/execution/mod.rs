pub mod binance;
pub mod executor;
pub mod okx;
pub mod pool;
pub mod queue;

pub use executor::{
    ExecutorError, LocalOrderId, Order, OrderBook, OrderBookLevel, OrderSide, OrderStatus, OrderType,
    PlaceOrderRequest, VenueExecutor,
};
pub use pool::{ExecutionResult, ExecutionStatus, PoolError, PoolStats, WorkerPool};
pub use queue::{ExecutionTask, QueueEmptyError, QueueFullError, TaskQueue};
