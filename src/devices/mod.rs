// MIT License - Copyright (c) 2026 Peter Wright
// Panel entities

pub mod area;
pub mod door;
pub mod faults;
pub mod history;
pub mod output;
pub mod point;

pub use area::{Area, AreaStatus, ReadyFlags};
pub use door::{Door, DoorStatus};
pub use faults::PanelFaults;
pub use history::{HistoryEvent, HistoryLog};
pub use output::{Output, OutputStatus};
pub use point::{Point, PointStatus};
