pub mod crop;
pub mod filters;
pub mod focal;
pub mod inspect;
pub mod resize;
pub mod smart_crop;
pub mod transparency;

pub use crop::{CropWindow, ImageCrop};
pub use filters::{ImageFilters, SharpenKernel};
pub use focal::{FocalPoint, FocalPointEstimator};
pub use inspect::AssetInspector;
pub use resize::ImageResize;
pub use smart_crop::{focal_crop, standard_crop, CropOutcome, CropPath, CropState, SmartCropper};
pub use transparency::TransparencyProbe;
