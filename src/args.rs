use std::path::PathBuf;

/// Streaming reader for OpenStreetMap XML data
#[derive(Debug, clap::Parser)]
#[clap(about, version, author)]
pub struct Args {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u8,

    /// Input OSM XML file (.osm or .osc)
    pub input: PathBuf,

    /// Also read changesets and their discussions
    #[clap(long)]
    pub changesets: bool,
}
