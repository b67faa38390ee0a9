pub mod swarm;

pub use swarm::Swarm;
