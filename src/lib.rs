// Modules
pub mod combination;
pub mod consts;
pub mod io;
pub mod portfolio;
pub mod sampling;
pub mod search;
pub mod universe;

pub use combination::{generate, Combination, Combinations};
pub use portfolio::{compute_portfolio_performance, sharpe_ratio, PortfolioPerformance};
pub use sampling::WeightSampler;
pub use search::{
    run, search, BestPortfolio, ComboFailure, ComboOutcome, ComboResult, RunConfig, SearchControl,
    SearchError, SearchReport,
};
pub use universe::AssetUniverse;
