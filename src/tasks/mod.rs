mod sweep;

pub use sweep::PresenceSweepTask;
