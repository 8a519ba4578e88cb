pub mod admin;
pub mod factory;
pub mod liquidity;
pub mod loan;
pub mod collateral;
pub mod borrow;
pub mod repay;
pub mod transfer;
pub mod queries;
pub mod relay;

pub use admin::*;
pub use factory::*;
pub use liquidity::*;
pub use loan::*;
pub use collateral::*;
pub use borrow::*;
pub use repay::*;
pub use transfer::*;
pub use queries::*;
pub use relay::*;
