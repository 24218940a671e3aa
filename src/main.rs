use anyhow::Result;
use clap::{Parser as ClapParser, ValueEnum};
use fieldwise::commastring::dtype_from_commastring;
use fieldwise::typestr::parse_type_str;
use fieldwise::{Descriptor, MalformedSpecError};
use ron::ser::PrettyConfig;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Syntax {
    Pep3118,
    Commastring,
    Typestr,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Table,
    Descr,
    Ron,
}

#[derive(ClapParser, Debug)]
struct Args {
    spec: String,

    #[arg(short, long, value_enum, default_value_t = Syntax::Pep3118)]
    syntax: Syntax,

    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Align comma-string fields to their natural boundaries.
    #[arg(long, default_value_t = false)]
    align: bool,
}

fn compile(spec: &str, syntax: Syntax, align: bool) -> Result<Descriptor, MalformedSpecError> {
    match syntax {
        Syntax::Pep3118 => Descriptor::from_pep3118(spec),
        Syntax::Commastring => dtype_from_commastring(spec, align),
        Syntax::Typestr => parse_type_str(spec),
    }
}

fn print_table(descr: &Descriptor, prefix: &str, base_offset: usize) {
    match descr.fields() {
        Some(fields) => {
            for field in fields {
                let name = if field.is_padding() {
                    "(padding)".to_string()
                } else {
                    format!("{prefix}{}", field.name)
                };

                let offset = base_offset + field.offset;
                println!(
                    "{name:<16} {offset:>6} {:>6} {}",
                    field.descr.itemsize(),
                    field.descr.type_str()
                );

                if field.descr.as_struct().is_some() {
                    print_table(&field.descr, &format!("{name}."), offset);
                }
            }
        }
        None => println!(
            "{:<16} {:>6} {:>6} {}",
            "-",
            base_offset,
            descr.itemsize(),
            descr.type_str()
        ),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Args {
        spec,
        syntax,
        format,
        align,
    } = Args::parse();

    let descr = match compile(&spec, syntax, align) {
        Ok(descr) => descr,
        Err(e) => {
            eprintln!("{}", e.render());
            std::process::exit(1);
        }
    };

    match format {
        Format::Table => {
            println!("{:<16} {:>6} {:>6} type", "name", "offset", "size");
            print_table(&descr, "", 0);
            println!(
                "itemsize {}, alignment {}",
                descr.itemsize(),
                descr.alignment()
            );
        }
        Format::Descr => println!("{}", descr.to_array_descr()?),
        Format::Ron => println!("{}", ron::ser::to_string_pretty(&descr, PrettyConfig::default())?),
    }

    Ok(())
}
