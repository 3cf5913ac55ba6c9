pub mod blacklist;
pub mod graph;
pub mod heap_builder;
pub mod ids;
pub mod merge;
pub mod records;
pub mod strategy;
pub mod summarizers;
pub mod vertex;
