pub mod catalog;
pub mod collaborative;
pub mod encoder;
pub mod onboarding;
pub mod ranker;
pub mod recommendations;
pub mod results;
pub mod scoring;
pub mod simulation;
