pub mod ids;
pub mod model;
pub mod row;
pub mod shuffle;
pub mod types;

pub use ids::*;
pub use model::*;
pub use row::*;
pub use shuffle::*;
pub use types::*;
