// rhizome - a grid-based organism-growth simulation engine. Sources grow
// branching tendrils that spend energy per cell, digest food pellets, form
// connections where rival growth meets, and decay once cut off.

pub mod api;
pub mod config;
pub mod error;
pub mod food;
pub mod grid;
mod growth;
mod integrity;
mod signal;
pub mod simulation;
pub mod source;
pub mod tendril;
pub mod types;
