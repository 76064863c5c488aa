use clap::Parser;
use jp2box::{ImageInfo, read_image_info};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Summarize a JP2 file or JPEG 2000 codestream")]
struct Args {
    /// JP2 file or raw codestream path
    path: String,

    /// Output as JSON instead of human-readable text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FileInfo<'a> {
    file: String,
    #[serde(flatten)]
    image: &'a ImageInfo,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let path = PathBuf::from(&args.path);

    let mut f = File::open(&path)?;
    let info = read_image_info(&mut f)?;

    if args.json {
        let out = FileInfo {
            file: path.display().to_string(),
            image: &info,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_human(&path.display().to_string(), &info);
    }

    Ok(())
}

fn print_human(file: &str, info: &ImageInfo) {
    println!("File: {}", file);
    println!("Format: {}", info.format);
    if let Some(brand) = &info.brand {
        println!("Brand: {}", brand);
    }
    if !info.compatible_brands.is_empty() {
        println!("Compatible brands: {}", info.compatible_brands.join(", "));
    }

    println!("Size: {}x{}", info.width, info.height);
    println!("Components: {}", info.components);
    if !info.bits_per_component.is_empty() {
        println!("Bit depths: {}", describe_depths(&info.bits_per_component, &info.signed));
    }
    if let Some(cs) = &info.colourspace {
        println!("Colourspace: {}", cs);
    }

    if let (Some(tw), Some(th)) = (info.tile_width, info.tile_height) {
        println!("Tile size: {}x{}", tw, th);
    }
    if let (Some(tx), Some(ty), Some(n)) = (info.tiles_x, info.tiles_y, info.tile_count) {
        println!("Tiles: {}x{} ({} total)", tx, ty, n);
    }

    if let Some(levels) = info.decomposition_levels {
        println!("Decomposition levels: {}", levels);
    }
    if let Some(layers) = info.layers {
        println!("Quality layers: {}", layers);
    }
    if let Some(order) = &info.progression_order {
        println!("Progression order: {}", order);
    }
    if let Some(t) = &info.transform {
        println!("Wavelet transform: {}", t);
    }
    if let Some((w, h)) = info.code_block_size {
        println!("Code-block size: {}x{}", w, h);
    }

    for c in &info.comments {
        println!("Comment: {}", c);
    }
    for x in &info.xml {
        println!("XML: {} bytes", x.len());
    }
}

// "8 x3" when every component agrees, otherwise one entry per component
fn describe_depths(depths: &[u8], signed: &[bool]) -> String {
    if depths.is_empty() {
        return String::new();
    }
    let uniform = depths.windows(2).all(|w| w[0] == w[1]) && signed.windows(2).all(|w| w[0] == w[1]);
    let suffix = |s: bool| if s { " (signed)" } else { "" };
    if uniform {
        let s = signed.first().copied().unwrap_or(false);
        return format!("{}{} x{}", depths[0], suffix(s), depths.len());
    }
    depths
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}{}", d, suffix(signed.get(i).copied().unwrap_or(false))))
        .collect::<Vec<_>>()
        .join(", ")
}
