/// Data layer: core types, ingestion, and signal transforms.
///
/// Architecture:
/// ```text
///   .csv text / remote upload
///        │
///        ▼
///   ┌──────────┐    ┌──────────┐
///   │  loader   │ ◄─ │ strategy │  remote first, local fallback
///   └──────────┘    └──────────┘
///        │
///        ▼
///   ┌───────────────┐
///   │ ParsedDataset │  headers, rows (≤ 1000), profile
///   └───────────────┘
///        │ light_curve_points()
///        ▼
///   ┌───────────┐
///   │ transform │  detrend / periodogram / phase-fold → DerivedSignals
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod strategy;
pub mod transform;
