use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::Parser;
use quick_xml::{
    Reader,
    events::{BytesStart, Event as XmlEvent},
};
use rngwalk::{
    Event, Grammar, GrammarWalker, NameClass, ValidationError, event::events_to_tree_string,
    read_tree,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[clap(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase log verbosity (-v info, -vv debug, -vvv trace)"
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Validate a document against a schema.
    Validate {
        #[clap(long, help = "Path to the schema (a JSON pattern tree)")]
        schema: PathBuf,
        #[clap(long, help = "Stop after this many errors")]
        max_errors: Option<usize>,
        #[clap(help = "Path to the document (stdin if omitted)")]
        document: Option<PathBuf>,
    },
    /// Print the events the schema allows at the end of a (possibly partial) document.
    Possible {
        #[clap(long, help = "Path to the schema (a JSON pattern tree)")]
        schema: PathBuf,
        #[clap(help = "Path to the document (stdin if omitted)")]
        document: Option<PathBuf>,
    },
    /// Show what a schema defines.
    Inspect {
        #[clap(long, help = "Path to the schema (a JSON pattern tree)")]
        schema: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns `Ok(false)` if the document is invalid.
fn run(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Validate {
            schema,
            max_errors,
            document,
        } => {
            let grammar = load_schema(&schema)?;
            let (name, text) = load_document(document.as_deref())?;
            let mut driver = Driver::new(&grammar, &name, max_errors);
            driver.feed(&text)?;
            if !driver.stopped() {
                let result = driver.walker.end();
                driver.report(result, None);
            }
            if driver.errors == 0 {
                info!("{name} is valid");
            }
            Ok(driver.errors == 0)
        }
        Command::Possible { schema, document } => {
            let grammar = load_schema(&schema)?;
            let (name, text) = load_document(document.as_deref())?;
            let mut driver = Driver::new(&grammar, &name, None);
            driver.feed(&text)?;
            let mut out = std::io::stdout().lock();
            out.write_all(events_to_tree_string(&driver.walker.possible()).as_bytes())?;
            Ok(driver.errors == 0)
        }
        Command::Inspect { schema } => {
            let grammar = load_schema(&schema)?;
            let mut out = std::io::stdout().lock();
            writeln!(out, "elements:")?;
            for (name, definitions) in grammar.element_definitions() {
                writeln!(out, "    {name} ({} definition(s))", definitions.len())?;
            }
            writeln!(out, "namespaces:")?;
            for ns in grammar.namespaces() {
                writeln!(out, "    {ns:?}")?;
            }
            writeln!(
                out,
                "wholly context independent: {}",
                grammar.wholly_context_independent()
            )?;
            Ok(true)
        }
    }
}

fn load_schema(path: &Path) -> anyhow::Result<Arc<Grammar>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema '{}'", path.display()))?;
    let grammar = read_tree(&json)
        .with_context(|| format!("failed to load schema '{}'", path.display()))?;
    debug!(
        elements = grammar.element_definitions().len(),
        "loaded schema '{}'",
        path.display()
    );
    Ok(grammar)
}

fn load_document(path: Option<&Path>) -> anyhow::Result<(String, String)> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read document '{}'", path.display()))?;
            Ok((path.display().to_string(), text))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read document from stdin")?;
            Ok(("<stdin>".to_owned(), text))
        }
    }
}

/// Translates parser events into validation events and reports errors.
struct Driver<'a> {
    walker: GrammarWalker,
    name: &'a str,
    max_errors: Option<usize>,
    errors: usize,
    /// Expanded names of the open elements.
    open: Vec<(String, String)>,
    /// Text is fired in one piece, so pieces split by the parser are buffered here.
    text: String,
}

impl<'a> Driver<'a> {
    fn new(grammar: &Arc<Grammar>, name: &'a str, max_errors: Option<usize>) -> Self {
        Self {
            walker: grammar.new_walker(),
            name,
            max_errors,
            errors: 0,
            open: vec![],
            text: String::new(),
        }
    }

    fn stopped(&self) -> bool {
        self.max_errors.is_some_and(|max| self.errors >= max)
    }

    fn feed(&mut self, text: &str) -> anyhow::Result<()> {
        let mut reader = Reader::from_str(text);
        loop {
            if self.stopped() {
                return Ok(());
            }
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .with_context(|| format!("{}:{position}: malformed document", self.name))?;
            match event {
                XmlEvent::Start(start) => {
                    self.flush_text(position);
                    self.start_tag(&start, position)?;
                }
                XmlEvent::Empty(start) => {
                    self.flush_text(position);
                    self.start_tag(&start, position)?;
                    self.end_tag(position);
                }
                XmlEvent::End(_) => {
                    self.flush_text(position);
                    self.end_tag(position);
                }
                XmlEvent::Text(text) => {
                    let text = text
                        .unescape()
                        .with_context(|| format!("{}:{position}: malformed text", self.name))?;
                    self.text.push_str(&text);
                }
                XmlEvent::CData(data) => {
                    self.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
                XmlEvent::Eof => {
                    self.flush_text(position);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn start_tag(
        &mut self,
        start: &BytesStart,
        position: impl std::fmt::Display,
    ) -> anyhow::Result<()> {
        self.fire(Event::EnterContext, &position);

        let mut attributes = vec![];
        for attribute in start.attributes() {
            let attribute = attribute
                .with_context(|| format!("{}:{position}: malformed attribute", self.name))?;
            let key = std::str::from_utf8(attribute.key.as_ref())?.to_owned();
            let value = attribute.unescape_value()?.into_owned();
            if key == "xmlns" {
                self.fire(Event::define_prefix("", value), &position);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.fire(Event::define_prefix(prefix, value), &position);
            } else {
                attributes.push((key, value));
            }
        }

        let qname = std::str::from_utf8(start.name().as_ref())?.to_owned();
        let Some(name) = self.walker.resolve_name(&qname, false) else {
            bail!("{}:{position}: cannot resolve element name '{qname}'", self.name);
        };
        let (uri, local) = (name.ns.to_string(), name.local.to_string());
        self.fire(Event::enter_start_tag(&uri, &local), &position);
        self.open.push((uri, local));

        for (key, value) in attributes {
            let Some(name) = self.walker.resolve_name(&key, true) else {
                bail!("{}:{position}: cannot resolve attribute name '{key}'", self.name);
            };
            self.fire(Event::attribute_name(&*name.ns, &*name.local), &position);
            self.fire(Event::attribute_value(value), &position);
        }
        self.fire(Event::LeaveStartTag, &position);
        Ok(())
    }

    fn end_tag(&mut self, position: impl std::fmt::Display) {
        // The parser checks that end tags match, so the stack is never empty here.
        if let Some((uri, local)) = self.open.pop() {
            self.fire(Event::end_tag(uri, local), &position);
            self.fire(Event::LeaveContext, &position);
        }
    }

    fn flush_text(&mut self, position: impl std::fmt::Display) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.fire(Event::Text(text), &position);
        }
    }

    fn fire(&mut self, event: Event, position: &dyn std::fmt::Display) {
        if self.stopped() {
            return;
        }
        let result = self.walker.fire_event(&event);
        self.report(result, Some(position));
    }

    fn report(
        &mut self,
        result: Result<(), Vec<ValidationError>>,
        position: Option<&dyn std::fmt::Display>,
    ) {
        let Err(errors) = result else {
            return;
        };
        for error in errors {
            if self.stopped() {
                return;
            }
            self.errors += 1;
            let names = error
                .names()
                .into_iter()
                .map(|name| self.display_name(name))
                .collect::<Vec<_>>();
            let message = error.to_string_with_names(&names);
            match position {
                Some(position) => eprintln!("{}:{position}: error: {message}", self.name),
                None => eprintln!("{}: error: {message}", self.name),
            }
        }
    }

    /// Show simple names with the prefixes the document uses, other name classes as JSON.
    fn display_name(&self, name: &NameClass) -> String {
        match name {
            NameClass::Name { ns, local } => self
                .walker
                .unresolve_name(ns, local)
                .unwrap_or_else(|| format!("{{{ns}}}{local}")),
            other => other.to_string(),
        }
    }
}
