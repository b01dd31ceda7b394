pub mod energy;
pub mod price;
pub mod reading;
pub mod repair;

pub use energy::*;
pub use price::*;
pub use reading::*;
pub use repair::*;
