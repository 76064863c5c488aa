use clap::{ArgAction, Parser};
use jp2box::{
    boxes::{BoxNode, FourCC},
    get_boxes, get_segments,
    known_boxes::KnownBox,
    markers,
    parser::parse_children,
    registry::{BoxValue, Registry},
    util::{hex_dump, read_slice},
};
use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{Seek, SeekFrom};

#[derive(Parser, Debug)]
#[command(version, about = "JP2 / JPEG 2000 record and marker explorer")]
struct Args {
    /// JP2 file or raw codestream path
    path: String,

    /// Only print subtree(s) matching a dotted path (e.g. jp2h.colr[1])
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Dump raw payload of this type code (e.g. --raw colr)
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Limit recursion depth (for text/tree output)
    #[arg(long, default_value_t = 32)]
    max_depth: usize,

    /// Print structured values when a decoder exists
    #[arg(long, action = ArgAction::SetTrue)]
    decode: bool,

    /// Also list the marker segments of each contiguous codestream
    #[arg(long, action = ArgAction::SetTrue)]
    codestream: bool,

    /// Show bytes count when dumping raw (0 means entire payload)
    #[arg(long, default_value_t = 0)]
    bytes: usize,

    /// Emit JSON instead of human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut f = File::open(&args.path)?;
    let file_len = f.metadata()?.len();

    if starts_with_soc(&mut f, file_len)? {
        // raw codestream, no file-format records around it
        let segments = get_segments(&mut f, 0, file_len, args.decode)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&segments)?);
        } else {
            print_segments(&segments, 0);
        }
        return Ok(());
    }

    if args.json {
        let boxes = get_boxes(&mut f, file_len, args.decode)?;
        println!("{}", serde_json::to_string_pretty(&boxes)?);
        return Ok(());
    }

    let top = parse_children(&mut f, Registry::standard(), 0, file_len)?;

    let targets: Vec<&BoxNode> = if let Some(path) = &args.filter {
        select_by_path(&top, path)
    } else {
        top.iter().collect()
    };

    for b in &targets {
        print_box(&mut f, b, 0, &args)?;
    }

    if let Some(sel) = args.raw.as_ref() {
        dump_raw(&mut f, &top, sel, args.bytes)?;
    }

    Ok(())
}

fn starts_with_soc(f: &mut File, file_len: u64) -> anyhow::Result<bool> {
    if file_len < 2 {
        return Ok(false);
    }
    f.seek(SeekFrom::Start(0))?;
    Ok(f.read_u16::<BigEndian>()? == markers::SOC)
}

// ---------- Human-readable tree ----------

fn print_box(f: &mut File, b: &BoxNode, depth: usize, args: &Args) -> anyhow::Result<()> {
    let indent = "  ".repeat(depth);
    let hdr = &b.hdr;
    let kb = KnownBox::from(hdr.typ);

    let note = match &b.value {
        BoxValue::Super => " (super)".to_string(),
        BoxValue::Generic => " (unknown)".to_string(),
        BoxValue::Invalid { reason } => format!(" [invalid: {}]", reason),
        _ => String::new(),
    };
    let to_end = if hdr.extends_to_end() { " to-end" } else { "" };
    println!(
        "{indent}{:>8} {:>10} {} {}{}{}",
        format!("{:#x}", hdr.start),
        hdr.size,
        hdr.typ,
        kb.full_name(),
        to_end,
        note
    );

    if args.decode && !matches!(b.value, BoxValue::Super | BoxValue::Generic | BoxValue::Invalid { .. }) {
        println!("{indent}        -> {}", serde_json::to_string(&b.value)?);
    }

    if args.codestream
        && let BoxValue::Codestream(cs) = &b.value
    {
        let segments = get_segments(f, cs.offset, cs.length, args.decode)?;
        print_segments(&segments, depth + 1);
    }

    if depth < args.max_depth {
        for c in &b.children {
            print_box(f, c, depth + 1, args)?;
        }
    }
    Ok(())
}

fn print_segments(segments: &[jp2box::JsonSegment], depth: usize) {
    let indent = "  ".repeat(depth);
    for s in segments {
        let len = s.length.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{indent}{:>8} {} {:>6} {} {}",
            format!("{:#x}", s.offset),
            s.marker,
            len,
            s.name,
            s.full_name
        );
        if let Some(v) = &s.decoded
            && let Ok(text) = serde_json::to_string(v)
        {
            println!("{indent}        -> {}", text);
        }
    }
}

// ---------- Raw dump ----------

fn dump_raw(f: &mut File, boxes: &[BoxNode], sel: &str, limit: usize) -> anyhow::Result<()> {
    let Some(typ) = FourCC::from_str(sel) else {
        anyhow::bail!("--raw expects a four-character type code, got {:?}", sel);
    };
    let mut matches = Vec::new();
    select_boxes(boxes, typ, &mut matches);
    for (i, b) in matches.into_iter().enumerate() {
        let len = b.hdr.data_len();
        let to_read = if limit == 0 || limit as u64 > len { len } else { limit as u64 };
        let off = b.hdr.data_offset();
        let data = read_slice(f, off, to_read)?;
        println!(
            "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
            i, b.hdr.typ, off, to_read
        );
        print!("{}", hex_dump(&data, off));
    }
    Ok(())
}

fn select_boxes<'a>(list: &'a [BoxNode], typ: FourCC, out: &mut Vec<&'a BoxNode>) {
    for b in list {
        if b.hdr.typ == typ {
            out.push(b);
        }
        select_boxes(&b.children, typ, out);
    }
}

// ---------- Filter path: jp2h.colr[1] ----------

fn select_by_path<'a>(roots: &'a [BoxNode], path: &str) -> Vec<&'a BoxNode> {
    let mut current: Vec<&'a BoxNode> = Vec::new();

    for (depth, seg) in path.split('.').enumerate() {
        let (name, idx) = parse_segment(seg);
        let fourcc = FourCC::from_str(name).unwrap_or(FourCC(*b"????"));

        let candidates: Vec<&'a BoxNode> = if depth == 0 {
            roots.iter().collect()
        } else {
            current.iter().flat_map(|b| b.children.iter()).collect()
        };
        let mut matches: Vec<&'a BoxNode> = candidates.into_iter().filter(|b| b.hdr.typ == fourcc).collect();
        current = match idx {
            Some(i) if i < matches.len() => vec![matches.swap_remove(i)],
            Some(_) => Vec::new(),
            None => matches,
        };

        if current.is_empty() {
            break;
        }
    }

    current
}

fn parse_segment(seg: &str) -> (&str, Option<usize>) {
    if let Some(l) = seg.find('[') {
        let name = &seg[..l];
        if let Some(r) = seg[l + 1..].find(']') {
            let idx = seg[l + 1..l + 1 + r].parse::<usize>().ok();
            return (name, idx);
        }
        (name, None)
    } else {
        (seg, None)
    }
}
