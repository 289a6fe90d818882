use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use dialoguer::Confirm;
use indoc::indoc;
use log::{LevelFilter, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use restmpl::utils::format_hexdump;
use restmpl::{CodecSettings, FieldView, Record, Segment, Template, TypeTag, Value};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum OutputFormat {
    Json,
    Text,
}

enum TemplateSource {
    Json(PathBuf),
    Tmpl(PathBuf),
}

struct RestmplDump {
    template: TemplateSource,
    input: PathBuf,
    output_format: OutputFormat,
    settings: CodecSettings,
    edits: Vec<(String, String)>,
    output: Option<PathBuf>,
    confirm_overwrite: bool,
    verbosity_level: Option<LevelFilter>,
}

impl RestmplDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .ok_or_else(|| anyhow!("missing INPUT"))?,
        );

        let template = match (
            matches.get_one::<String>("template"),
            matches.get_one::<String>("tmpl"),
        ) {
            (Some(path), _) => TemplateSource::Json(PathBuf::from(path)),
            (None, Some(path)) => TemplateSource::Tmpl(PathBuf::from(path)),
            (None, None) => bail!("either `--template` or `--tmpl` is required"),
        };

        let output_format = match matches.get_one::<String>("output-format").map(String::as_str) {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Text,
        };

        let encoding_label = matches
            .get_one::<String>("encoding")
            .map(String::as_str)
            .unwrap_or("macintosh");
        let settings = CodecSettings::new()
            .strict(matches.get_flag("strict"))
            .text_encoding_label(encoding_label)
            .ok_or_else(|| anyhow!("unknown text encoding `{encoding_label}`"))?;

        let edits = matches
            .get_many::<String>("set")
            .into_iter()
            .flatten()
            .map(|edit| {
                edit.split_once('=')
                    .map(|(path, value)| (path.trim().to_owned(), value.to_owned()))
                    .ok_or_else(|| anyhow!("`--set {edit}` is not of the form PATH=VALUE"))
            })
            .collect::<Result<Vec<_>>>()?;

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            3 => Some(LevelFilter::Trace),
            _ => {
                eprintln!("using more than -vvv does not affect verbosity level");
                Some(LevelFilter::Trace)
            }
        };

        Ok(RestmplDump {
            template,
            input,
            output_format,
            settings,
            edits,
            output: matches.get_one::<String>("output-target").map(PathBuf::from),
            confirm_overwrite: !matches.get_flag("no-confirm-overwrite"),
            verbosity_level,
        })
    }

    /// Main entry point for `RestmplDump`
    pub fn run(&self) -> Result<()> {
        self.try_to_initialize_logging();

        let template = self.load_template()?;
        let data = fs::read(&self.input)
            .with_context(|| format!("Failed to read input file at {}", self.input.display()))?;

        let mut record = match Record::decode_with(&template, &data, &self.settings) {
            Ok(record) => record,
            Err(e) => {
                if let Some(offset) = e.offset() {
                    eprint!("{}", hexdump_around(&data, offset));
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to decode {}", self.input.display())));
            }
        };

        for (path, text) in &self.edits {
            let event = record
                .set_text(path.as_str(), text, &self.settings)
                .with_context(|| format!("Failed to set `{path}` to `{text}`"))?;
            info!("{}", event);
        }

        match &self.output {
            Some(path) => {
                let bytes = record.encode().context("Failed to encode the edited record")?;
                let mut file = self.create_output_file(path)?;
                file.write_all(&bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                match self.output_format {
                    OutputFormat::Json => {
                        let json = record.to_json_value(&self.settings);
                        writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
                    }
                    OutputFormat::Text => self.dump_text(&record, &mut out)?,
                }
            }
        }

        Ok(())
    }

    fn load_template(&self) -> Result<Arc<Template>> {
        match &self.template {
            TemplateSource::Json(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read template {}", path.display()))?;
                Template::from_json(&json)
                    .with_context(|| format!("Invalid template {}", path.display()))
            }
            TemplateSource::Tmpl(path) => {
                let data = fs::read(path)
                    .with_context(|| format!("Failed to read TMPL {}", path.display()))?;
                let template = Template::from_tmpl(&data)
                    .with_context(|| format!("Invalid TMPL resource {}", path.display()))?;
                Ok(Arc::new(template))
            }
        }
    }

    fn dump_text(&self, record: &Record, out: &mut impl Write) -> Result<()> {
        for view in record.fields() {
            writeln!(out, "{}", self.format_view(&view))?;
        }

        if !record.trailing().is_empty() {
            writeln!(out, "{} trailing bytes:", record.trailing().len())?;
            write!(
                out,
                "{}",
                format_hexdump(record.trailing(), record.root().length())
            )?;
        }
        Ok(())
    }

    fn format_view(&self, view: &FieldView) -> String {
        let depth = view.path.segments().len().saturating_sub(1);
        let name = match view.path.segments().last() {
            Some(Segment::Name(name)) => name.clone(),
            Some(Segment::Index(index)) => format!("[{index}]"),
            None => String::new(),
        };

        let shown = match (view.value, view.tag) {
            (Some(Value::Text(bytes)), _) => format!("{:?}", self.settings.decode_text(bytes)),
            (Some(value), _) => match view.label {
                Some(label) => format!("{value} ({label})"),
                None => value.to_string(),
            },
            (None, TypeTag::Group) => format!("{} bytes", view.length),
            (None, _) => String::new(),
        };

        format!(
            "{:08x}  {:indent$}{} = {} [{}]",
            view.offset,
            "",
            name,
            shown,
            view.tag,
            indent = depth * 2
        )
    }

    /// If `confirm_overwrite` is set, will display a confirmation prompt before overwriting files.
    fn create_output_file(&self, path: &Path) -> Result<File> {
        if path.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                path.display()
            );
        }

        if path.exists() && self.confirm_overwrite {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Are you sure you want to override output file at {}",
                    path.display()
                ))
                .default(false)
                .interact()
                .context("Failed to write confirmation prompt to term")?;
            if !confirmed {
                bail!("Cancelled");
            }
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        File::create(path).with_context(|| format!("Failed to create {}", path.display()))
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {e}");
            }
        }
    }
}

/// Two lines of hex around `offset`, for pointing at the bytes a decode choked on.
fn hexdump_around(data: &[u8], offset: usize) -> String {
    let start = (offset - offset % 16).min(data.len());
    let end = (start + 32).min(data.len());
    format_hexdump(&data[start..end], start)
}

fn command() -> Command {
    Command::new("restmpl_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decode (and edit) a classic Mac OS resource using a template")
        .long_about(indoc!(
            r#"
            Decodes a raw resource payload against a template and prints its fields.

            The template is either a JSON list of field descriptors (`--template`) or a binary
            ResEdit `TMPL` resource (`--tmpl`). Fields can be edited with `--set PATH=VALUE`;
            pass `-f` to write the re-encoded resource to a file.
        "#
        ))
        .arg(Arg::new("INPUT").required(true).help("Raw resource data."))
        .arg(
            Arg::new("template")
                .short('t')
                .long("template")
                .value_name("JSON")
                .help("Template as a JSON list of field descriptors."),
        )
        .arg(
            Arg::new("tmpl")
                .short('T')
                .long("tmpl")
                .value_name("TMPL")
                .help("Template as a binary ResEdit TMPL resource."),
        )
        .group(
            ArgGroup::new("template-source")
                .args(["template", "tmpl"])
                .required(true),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["json", "text"])
                .default_value("text")
                .help("Sets the output format"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Fail when the template does not consume the whole input."),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .default_value("macintosh")
                .help("Text encoding of string fields (a WHATWG label)."),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("PATH=VALUE")
                .action(ArgAction::Append)
                .help("Sets a field before output, e.g. `--set strings[0].text=Hello`. Repeatable."),
        )
        .arg(
            Arg::new("output-target")
                .short('f')
                .long("output")
                .value_name("FILE")
                .help("Writes the re-encoded resource to FILE instead of printing it. \
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`. \
                       Will create parent directories if needed."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace"),
        )
}

fn main() {
    let matches = command().get_matches();

    let result = RestmplDump::from_cli_matches(&matches).and_then(|app| app.run());
    if let Err(e) = result {
        eprintln!("{e:#}");
        exit(1);
    }
}
