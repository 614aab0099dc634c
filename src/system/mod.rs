pub mod cpu;
pub mod processors;
pub mod topology;
