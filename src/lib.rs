//! Camouflage detection: image selection, a proxy to a hosted multimodal
//! model, and rendering of the returned judgment.

pub mod acquisition;
pub mod analysis;
pub mod client;
pub mod model;
pub mod presenter;
pub mod server;
pub mod session;
pub mod utils;

pub use acquisition::{select, ImageFile, UploadedImage};
pub use analysis::AnalysisResult;
pub use client::{AnalysisClient, AnalysisError, ClientConfig};
pub use presenter::{render, ResultView};
pub use session::{Event, Notice, Session};
