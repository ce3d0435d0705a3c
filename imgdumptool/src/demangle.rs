use imgdump::demangle::{NotDemangled, demangle};

#[derive(clap::Parser)]
pub struct DemangleOptions {
    /// The decorated names, e.g. `?Foo@Bar@@QAEXXZ`
    #[arg(required = true)]
    pub symbols: Vec<String>,
}

pub fn command(options: DemangleOptions) -> anyhow::Result<()> {
    for symbol in options.symbols.iter() {
        match demangle(symbol) {
            Ok(d) => println!("{d}"),
            Err(NotDemangled::NotMangled) => println!("{symbol}"),
            Err(NotDemangled::Grammar) => {
                tracing::warn!(symbol = symbol.as_str(), "could not demangle");
                println!("{symbol}");
            }
        }
    }
    Ok(())
}
