use std::fs;
use std::io::{Read, Write as _};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use ain::encoding::{conv_in, Encoding};
use ain::jaf::Source;
use ain::jam::{assemble_replace, disassemble_function};
use ain::types::RefFunction;
use ain::AinFile;

/// Command line driver for reading, patching and rebuilding AIN bytecode files.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the whole file, one function at a time, as JAM text.
    Dump {
        /// The `.ain` file to read.
        file: PathBuf,
        /// Dump strings/messages as a TEXT assignment stream instead of JAM.
        #[clap(long)]
        text: bool,
        /// Dump the canonical JSON mirror instead of JAM.
        #[clap(long)]
        json: bool,
        /// Skip folding recognised opcode sequences back into pseudo-ops.
        #[clap(long)]
        no_macros: bool,
        /// Reconstruct plausible file names from function name prefixes
        /// before dumping, when the file's own filename table is empty.
        #[clap(long)]
        guess_filenames: bool,
    },
    /// Apply JAF source, JAM text, or a TEXT assignment stream to a file and
    /// write the result back out.
    Edit {
        /// The `.ain` file to start from.
        file: PathBuf,
        /// Where to write the result. Defaults to overwriting `file`.
        #[clap(short, long)]
        output: Option<PathBuf>,
        /// Replace a function's body by disassembling `source` as JAM text
        /// and re-assembling it (`FUNC <name>` header selects the target).
        #[clap(long)]
        jam: Option<PathBuf>,
        /// Apply a TEXT assignment stream (`s[i] = "..."` / `m[i] = "..."`).
        #[clap(long)]
        text: Option<PathBuf>,
        /// Compile JAF source and append its declarations to the file.
        #[clap(long)]
        jaf: Vec<PathBuf>,
        /// Store the container zlib-compressed (the default for file version >= 6).
        #[clap(long)]
        compress: bool,
        /// Encoding --jam/--text/--jaf source files are authored in.
        #[clap(long, value_enum, default_value = "utf8")]
        source_encoding: SourceEncoding,
    },
}

/// CLI-facing mirror of [`ain::encoding::Encoding`]; kept separate so the
/// wire-level enum doesn't need to grow `clap::ValueEnum` derives for its own sake.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceEncoding {
    Utf8,
    Cp932,
}

impl From<SourceEncoding> for Encoding {
    fn from(e: SourceEncoding) -> Self {
        match e {
            SourceEncoding::Utf8 => Encoding::Utf8,
            SourceEncoding::Cp932 => Encoding::Cp932,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let tty = atty::is(atty::Stream::Stdout);
    let mut stdout = StandardStream::stdout(if tty { ColorChoice::Auto } else { ColorChoice::Never });

    match args.command {
        Command::Dump { file, text, json, no_macros, guess_filenames } => {
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let mut ain = AinFile::from_bytes(&bytes).context("parsing .ain file")?;
            if guess_filenames {
                ain.guess_filenames();
            }

            if json {
                let value = ain.to_json_value();
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            if text {
                print!("{}", ain::text::write_text(&ain));
                return Ok(());
            }

            let opts = ain::jam::disassembler::DisassembleOptions {
                fold_macros: !no_macros,
                print_header: true,
            };
            for (i, f) in ain.functions.iter().enumerate() {
                if f.address.is_none() {
                    continue;
                }
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                writeln!(stdout, "; function@{i} {}", f.name)?;
                stdout.reset()?;
                match disassemble_function(&ain, RefFunction(i), opts) {
                    Ok(text) => print!("{text}"),
                    Err(e) => eprintln!("; error: {e}"),
                }
            }
            Ok(())
        }

        Command::Edit { file, output, jam, text, jaf, compress, source_encoding } => {
            let encoding = Encoding::from(source_encoding);
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let mut ain = AinFile::from_bytes(&bytes).context("parsing .ain file")?;
            ain.source_encoding = encoding;

            if let Some(path) = jam {
                let source = read_source(&path, encoding)?;
                assemble_replace(&mut ain, &source).context("assembling JAM source")?;
            }

            if let Some(path) = text {
                let source = read_source(&path, encoding)?;
                ain::text::read_text(&mut ain, &source).context("applying TEXT assignments")?;
            }

            if !jaf.is_empty() {
                let contents: Vec<(PathBuf, String)> = jaf
                    .iter()
                    .map(|p| read_source(p, encoding).map(|s| (p.clone(), s)))
                    .collect::<anyhow::Result<_>>()?;
                let sources: Vec<Source> = contents
                    .iter()
                    .map(|(path, text)| Source {
                        filename: ain::Str::from(path.display().to_string()),
                        text: text.as_str(),
                    })
                    .collect();
                let warnings = ain::jaf::compile(&mut ain, &sources).context("compiling JAF source")?;
                ain.diagnostics.extend(warnings);
            }

            for w in &ain.diagnostics {
                eprintln!("{w}");
            }

            let out_path = output.unwrap_or(file);
            let bytes = ain.to_bytes(compress || ain.version_major >= 6).context("serializing .ain file")?;
            fs::write(&out_path, bytes).with_context(|| format!("writing {}", out_path.display()))?;
            Ok(())
        }
    }
}

/// Read a source file (or stdin, for `-`) and decode it from `encoding` into
/// the UTF-8 every JAF/JAM/TEXT parser in this crate expects (spec §9).
fn read_source(path: &PathBuf, encoding: Encoding) -> anyhow::Result<String> {
    let bytes = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(path).with_context(|| format!("reading {}", path.display()))?
    };
    Ok(conv_in(&bytes, encoding).as_str().to_string())
}
