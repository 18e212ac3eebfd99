pub mod batch;
pub mod ccs;
pub mod chunk;
pub mod cigar;
pub mod compile;
pub mod config;
pub mod error;
pub mod external;
pub mod fasta;
pub mod holes;
pub mod io;
pub mod kinetics;
pub mod molecule;
pub mod nt;
pub mod pipeline;
pub mod sam;
