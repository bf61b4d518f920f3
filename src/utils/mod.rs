pub mod logging;
pub mod seeded;

pub use seeded::SeededRng;
