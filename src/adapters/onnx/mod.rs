pub mod draw;
pub mod model_catalog;
pub mod yolo_engine;
