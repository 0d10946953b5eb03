//! Session manager tests: stub siren and callback sinks around a scripted
//! transport, driving the full event → speech → result path.

mod helpers;
mod scenarios;
