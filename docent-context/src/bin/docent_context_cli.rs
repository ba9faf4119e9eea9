use clap::Parser;
use docent_context::{DocumentExtractor, DocumentFormat, FileExtractor};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// A CLI tool to extract a document's title and normalized text as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input document. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// File name used for format detection and title fallback when reading stdin.
    #[arg(short, long, default_value = "stdin.txt")]
    name: String,

    /// Maximum number of characters kept from the document text.
    #[arg(short, long, default_value_t = docent_context::DEFAULT_MAX_TEXT_CHARS)]
    max_text_chars: usize,
}

#[derive(Serialize)]
struct ExtractionOutput<'a> {
    source: &'a str,
    format: DocumentFormat,
    title: Option<String>,
    text: Option<String>,
    chars: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let (name, bytes) = if let Some(input_path) = &args.input {
        (input_path.clone(), fs::read(input_path)?)
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        (args.name.clone(), buffer)
    };

    let path = Path::new(&name);
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported file type: {name}"),
        )
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());

    let extractor = FileExtractor::new(args.max_text_chars);
    let extracted = extractor
        .extract(&file_name, &bytes, format)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    let output = ExtractionOutput {
        source: &name,
        format,
        chars: extracted.as_ref().map_or(0, |d| d.text.chars().count()),
        title: extracted.as_ref().map(|d| d.title.clone()),
        text: extracted.map(|d| d.text),
    };

    let json_output = serde_json::to_string_pretty(&output)?;
    println!("{}", json_output);

    Ok(())
}
