pub mod id_map;
pub mod providers;
pub mod recommendations;
pub mod resolver;
pub mod title_search;

pub use id_map::IdMap;
pub use recommendations::Recommender;
pub use resolver::{IdResolver, IdTranslator};
