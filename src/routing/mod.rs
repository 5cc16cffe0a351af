//! Response routing: local strategy chain, remote gateway, and the router
//! that picks between them

pub mod handlers;
pub mod router;
pub mod strategy;

pub use handlers::{default_handlers, HandlerInput, ResponseHandler, CAPABILITY_MENU};
pub use router::{
    degraded_notice, HybridRouter, RoutePath, RouteReason, RoutedResponse, RoutingDecision,
    COMPLEX_INDICATORS,
};
pub use strategy::{ChainOutcome, DispatchMode, StrategyChain};
