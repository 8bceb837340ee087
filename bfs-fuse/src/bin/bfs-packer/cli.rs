use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file backing the file system
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image, overwriting any existing one
    Format {
        /// Total blocks of the image
        #[arg(long, short, default_value_t = 4096)]
        blocks: u32,
    },

    /// Copy a host file into the image
    Put {
        source: PathBuf,

        /// Name inside the image, defaults to the source file name
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Write a file of the image to stdout
    Cat { name: String },

    /// Print the size of a file in bytes
    Size { name: String },

    /// List files and free space
    Ls,
}
