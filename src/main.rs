use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use vm1::{assemble, disassemble, output, Assembly, RunState, IMAGE_EXT};

/// Assembler and virtual machine for the VM1 register architecture.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a source or `.vbc` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a source file or `.vbc` image and report the final machine state
    Run {
        /// Source or `.vbc` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a source file into a `.vbc` image
    Compile {
        /// Source file to compile
        name: PathBuf,
        /// Destination to output the image
        dest: Option<PathBuf>,
        /// List labels and emitted instructions
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check a source file without running or writing an image
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print a listing of a source file or `.vbc` image
    Disasm {
        /// File to list
        name: PathBuf,
    },
    /// Place a watch on a source file to receive constant assembler updates
    Watch {
        /// Source file to watch
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    vm1::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .context_lines(vm1::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run { name, minimal }) => run(&name, minimal),
        Some(Command::Compile {
            name,
            dest,
            verbose,
        }) => compile(&name, dest, verbose),
        Some(Command::Check { name }) => {
            file_message(MsgColor::Green, "Checking", &name);
            assemble_file(&name)?;
            message(MsgColor::Green, "Success", "no errors found!");
            Ok(())
        }
        Some(Command::Disasm { name }) => {
            let image = load_image(&name)?;
            for line in disassemble(&image) {
                println!("{line}");
            }
            Ok(())
        }
        Some(Command::Watch { name }) => watch(name),
        None => match args.path {
            Some(path) => run(&path, false),
            None => {
                println!("\n~ vm1 v{VERSION} ~");
                println!("{}", LOGO.truecolor(120, 190, 255).bold());
                println!("{SHORT_INFO}");
                std::process::exit(0);
            }
        },
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    // Keep stdout clean for the program's own output
    if output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn is_image(name: &Path) -> bool {
    name.extension().is_some_and(|ext| ext == IMAGE_EXT)
}

/// Assemble a source file, printing any warnings.
fn assemble_file(name: &Path) -> Result<Assembly> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let assembly = assemble(&src)?;
    for warning in assembly.warnings() {
        eprintln!("{:?}", warning);
    }
    Ok(assembly)
}

/// Read a `.vbc` image as-is, or assemble anything else.
fn load_image(name: &Path) -> Result<Vec<u8>> {
    if !name.exists() {
        bail!("File `{}` does not exist. Exiting...", name.display());
    }
    if is_image(name) {
        fs::read(name).into_diagnostic()
    } else {
        Ok(assemble_file(name)?.into_image())
    }
}

fn run(name: &Path, minimal: bool) -> Result<()> {
    let env = vm1::env::get();
    output::set_minimal(minimal || env.minimal);

    file_message(MsgColor::Green, "Assembling", name);
    let image = load_image(name)?;
    if image.is_empty() {
        bail!("Image is empty, nothing to run");
    }

    let mut state = RunState::new(image);
    state.set_trace(env.trace);

    message(MsgColor::Green, "Running", "emitted binary");
    state.run_stdout().into_diagnostic()?;
    // Program output does not necessarily end in a newline
    if !output::is_minimal() {
        println!();
    }
    output::print_state(&mut io::stdout(), &state).into_diagnostic()?;

    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn compile(name: &Path, dest: Option<PathBuf>, verbose: bool) -> Result<()> {
    file_message(MsgColor::Green, "Assembling", name);
    let assembly = assemble_file(name)?;

    if verbose {
        message(MsgColor::Cyan, "Labels", &assembly.labels().len().to_string());
        for (label, addr) in assembly.labels().iter() {
            println!("{:>12} {:04x}", label, addr);
        }
        message(MsgColor::Cyan, "Listing", &format!("{} bytes", assembly.image().len()));
        for line in disassemble(assembly.image()) {
            println!("{:>12} {line}", "");
        }
    }

    let out_file_name = match dest {
        Some(dest) => dest,
        None => match name.with_extension(IMAGE_EXT).file_name() {
            Some(file_name) => PathBuf::from(file_name),
            None => bail!("Cannot derive an output name from `{}`", name.display()),
        },
    };
    fs::write(&out_file_name, assembly.image()).into_diagnostic()?;

    message(MsgColor::Green, "Finished", "emit binary");
    file_message(MsgColor::Green, "Saved", &out_file_name);
    Ok(())
}

fn watch(name: PathBuf) -> Result<()> {
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Editors that swap files on save break a watch on the file itself
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(MsgColor::Green, "Watching", &name);
    message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

    let mut watcher =
        Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(MsgColor::Green, "Watching", &name);
                message(MsgColor::Green, "Re-checking", "file change detected");
                message(MsgColor::Cyan, "Help", "press CTRL+C to exit");

                // Makes reruns visible
                sleep(Duration::from_millis(50));

                match assemble_file(&name) {
                    Ok(assembly) => {
                        let summary = format!(
                            "no errors found! ({} bytes, {} labels)",
                            assembly.image().len(),
                            assembly.labels().len()
                        );
                        message(MsgColor::Green, "Success", &summary);
                    }
                    Err(e) => println!("\n{:?}", e),
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

const LOGO: &str = r#"
 __   ___ __ ___  / |
 \ \ / / '_ ` _ \ | |
  \ V /| | | | | || |
   \_/ |_| |_| |_||_|"#;

const SHORT_INFO: &str = r"
Welcome to vm1, an assembler and virtual machine for a tiny
four-register, eight-flag architecture.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
