//! Scenario tests driven by in-process mock providers


mod binding;
mod loops;
mod sequencing;
