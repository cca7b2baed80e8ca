use clap::{Args, Parser, Subcommand};
use docxkit::DocxTemplate;
use std::fs::File;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

fn main() -> std::io::Result<()> {
    let opts = Options::parse();
    match opts.subcmd {
        SubCommand::Apply(subcmd_opts) => docx_template_apply(subcmd_opts),
        SubCommand::Variables(subcmd_opts) => docx_template_variables(subcmd_opts),
    }
}

fn open_template(path: &PathBuf) -> std::io::Result<DocxTemplate> {
    DocxTemplate::from_file(path).map_err(|error| {
        let message = format!("Could not read the DOCX template: {}", error);
        Error::new(ErrorKind::InvalidData, message)
    })
}

fn docx_template_apply(opts: ApplyOptions) -> std::io::Result<()> {
    if opts.output == opts.template {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Output file name cannot be the same as the template file name.",
        ));
    }
    if opts.output == opts.json {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Output file name cannot be the same as the JSON file name.",
        ));
    }

    let mut template = open_template(&opts.template)?;
    for (name, path) in &opts.media {
        template.add_media(name, std::fs::read(path)?);
    }

    let data_fh = File::open(&opts.json)?;
    let data: serde_json::Value = serde_json::from_reader(data_fh)?;

    template
        .apply(&data)
        .and_then(|_| template.save(&opts.output))
        .map_err(|error| {
            let message = format!("Could not render the DOCX template: {}", error);
            Error::new(ErrorKind::Other, message)
        })
}

fn docx_template_variables(opts: VariablesOptions) -> std::io::Result<()> {
    let template = open_template(&opts.template)?;
    let variables = template.variables().map_err(|error| {
        let message = format!("Could not read the template variables: {}", error);
        Error::new(ErrorKind::InvalidData, message)
    })?;
    for variable in variables {
        println!("{}", variable);
    }
    Ok(())
}

/// `name=path`, or a bare path registered under its file name.
fn parse_media(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        Some(_) => Err(format!("'{}' is not of the form name=path", value)),
        None => {
            let path = PathBuf::from(value);
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| format!("'{}' has no file name", value))?
                .to_string();
            Ok((name, path))
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, author = "Jevgeni Tarasov <jevgeni@hey.com>")]
struct Options {
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    Apply(ApplyOptions),
    Variables(VariablesOptions),
}

/// Apply JSON data to a DOCX template.
#[derive(Args, Debug)]
struct ApplyOptions {
    /// Path to the .docx file acting as a template.
    #[arg(short, long)]
    template: PathBuf,

    /// Path to the .json file with the data to be pasted into the template.
    #[arg(short, long)]
    json: PathBuf,

    /// Output file name.
    #[arg(short, long)]
    output: PathBuf,

    /// Image the template refers to, as name=path. May be repeated.
    #[arg(short, long, value_parser = parse_media)]
    media: Vec<(String, PathBuf)>,
}

/// List the data fields a DOCX template refers to.
#[derive(Args, Debug)]
struct VariablesOptions {
    /// Path to the .docx file acting as a template.
    #[arg(short, long)]
    template: PathBuf,
}
