#![forbid(unused_must_use)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::single_match)]
#![allow(clippy::upper_case_acronyms)]

use clap::Parser;

mod demangle;
mod dump;
mod identify;

#[derive(clap::Parser)]
struct CommandWithFlags {
    /// Reduce logging to just warnings and errors.
    #[arg(long)]
    quiet: bool,

    /// Turn on debug output in all `imgdump` and `imgdumptool` modules. Noisy!
    #[arg(long)]
    verbose: bool,

    /// Show timestamps in log messages
    #[arg(long)]
    timestamps: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Decodes a file and prints everything that could be read from it. Parts that could not be
    /// decoded are shown as `<...>` markers in place of their contents.
    Dump(dump::DumpOptions),
    /// Prints the format of a file, as recognized by its signature.
    Identify(identify::IdentifyOptions),
    /// Demangles one or more Microsoft C++ decorated names. Names that cannot be demangled are
    /// printed unchanged.
    Demangle(demangle::DemangleOptions),
}

fn main() -> anyhow::Result<()> {
    let command_with_flags = CommandWithFlags::parse();
    configure_tracing(&command_with_flags);

    match command_with_flags.command {
        Command::Dump(args) => dump::dump_main(args)?,
        Command::Identify(args) => identify::command(args)?,
        Command::Demangle(args) => demangle::command(args)?,
    }

    Ok(())
}

fn configure_tracing(args: &CommandWithFlags) {
    use tracing_subscriber::filter::LevelFilter;

    let max_level = if args.quiet {
        LevelFilter::WARN
    } else if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if args.timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
}
