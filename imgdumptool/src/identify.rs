use anyhow::bail;
use imgdump::{FormatKind, ImageView};
use std::path::Path;

#[derive(clap::Parser)]
pub struct IdentifyOptions {
    /// The file to identify
    pub file: String,
}

pub fn command(options: IdentifyOptions) -> anyhow::Result<()> {
    let view = ImageView::open(Path::new(&options.file))?;
    let kind = imgdump::identify(&view);
    if kind == FormatKind::Unknown {
        bail!("{}: unrecognized format", options.file);
    }
    println!("{}: {kind}", options.file);
    Ok(())
}
