mod cli;

use std::error::Error;
use std::fs;
use std::io::{self, Write};

use bfs::{Bfs, FileSystem};
use clap::Parser;
use cli::{Cli, Command};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Format { blocks } => {
            bfs_fuse::format(&cli.image, blocks)?;
            println!("formatted {:?}: {blocks} blocks", cli.image);
        }
        Command::Put { source, name } => {
            let name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .and_then(|fname| fname.to_str())
                    .ok_or("source has no valid file name")?
                    .to_owned(),
            };
            let data = fs::read(&source)?;

            let mut fs = bfs_fuse::mount(&cli.image)?;
            let fd = fs.create(&name)?;
            fs.write(fd, data.len() as isize, &data)?;
            fs.close(fd)?;
            log::info!("put {source:?} as {name:?}, {} bytes", data.len());
        }
        Command::Cat { name } => {
            let mut fs = bfs_fuse::mount(&cli.image)?;
            cat(&mut fs, &name)?;
        }
        Command::Size { name } => {
            let mut fs = bfs_fuse::mount(&cli.image)?;
            let fd = fs.open(&name)?;
            println!("{}", fs.size(fd)?);
            fs.close(fd)?;
        }
        Command::Ls => {
            let mut fs = bfs_fuse::mount(&cli.image)?;
            for name in fs.volume().ls() {
                println!("{name}");
            }
            let (total, free) = fs.volume().usage();
            println!("{free}/{total} blocks free");
        }
    }

    Ok(())
}

fn cat(fs: &mut FileSystem<Bfs>, name: &str) -> Result<(), Box<dyn Error>> {
    let fd = fs.open(name)?;
    let mut stdout = io::stdout().lock();
    let mut buf = [0; 4096];

    loop {
        let len = fs.read(fd, buf.len() as isize, &mut buf)?;
        if len == 0 {
            break;
        }
        stdout.write_all(&buf[..len])?;
    }

    fs.close(fd)?;
    Ok(())
}
