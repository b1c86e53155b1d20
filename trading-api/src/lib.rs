pub mod error;
pub mod model;
pub mod traits;

pub use error::{EngineError, GatewayError, StoreError};
pub use model::cycle::CycleStatus;
pub use model::holding::{BalanceSnapshot, Holding};
pub use model::instrument::{Instrument, Venue, VenueBook};
pub use model::order::{round_to_cents, OrderAck, OrderRequest, OrderSide, OrderType};
pub use model::plan::{RebalanceAction, RebalanceItem, RebalancePlan};
pub use model::settings::Settings;
pub use model::trade_log::{TradeLog, TradeOrigin, TradeQuery};
pub use traits::broker::BrokerGateway;
pub use traits::store::Store;

pub mod prelude {
    pub use crate::error::{EngineError, GatewayError, StoreError};
    pub use crate::model::instrument::{Instrument, Venue};
    pub use crate::model::order::{OrderRequest, OrderSide, OrderType};
    pub use crate::traits::broker::BrokerGateway;
    pub use crate::traits::store::Store;
}
