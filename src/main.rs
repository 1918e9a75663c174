use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use treepatch::TreePatchError;
use treepatch::config::{MergedConfig, discover_configs, load_merged_config, user_config_path};
use treepatch::patch::{PatchDocument, decode, encode, write_document};
use treepatch::rules::{Rule, RuleKind, RuleSet};
use treepatch::select::SkipPath;
use treepatch::{apply, select, snapshot};

const DEFAULT_OUTPUT: &str = "output.patch";

#[derive(Parser)]
#[command(name = "treepatch")]
#[command(
	author,
	version,
	about = "Package a filtered directory tree as a single patch document and apply it elsewhere"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Log rule decisions and written files to stderr
	#[arg(short, long, global = true)]
	verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Select files under SOURCE_DIR and write them as one patch document
	Create {
		/// Include paths matching PATTERN (rules are tried in command-line order)
		#[arg(long, value_name = "PATTERN")]
		include: Vec<String>,

		/// Exclude paths matching PATTERN (rules are tried in command-line order)
		#[arg(long, value_name = "PATTERN")]
		exclude: Vec<String>,

		/// Patch document to write, `-` for stdout [default: output.patch]
		#[arg(short, long, value_name = "FILE")]
		output: Option<PathBuf>,

		/// Ignore .treepatch.toml files
		#[arg(long)]
		no_config: bool,

		/// Print the selected paths instead of writing a patch
		#[arg(long)]
		list: bool,

		/// Directory to package
		source: PathBuf,
	},
	/// Write every file added by PATCH under DEST
	Apply {
		/// Validate the patch and list target paths without writing
		#[arg(long)]
		check: bool,

		/// Patch document to read, `-` for stdin
		patch: PathBuf,

		/// Destination root
		destination: PathBuf,
	},
	/// Configuration management commands
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Display the config cascade for DIR with source annotations
	Show {
		#[arg(default_value = ".")]
		dir: PathBuf,
	},
	/// Check all config files for DIR without packaging anything
	Validate {
		#[arg(default_value = ".")]
		dir: PathBuf,
	},
}

fn main() -> ExitCode {
	match run() {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			if is_nothing_matched(&e) {
				ExitCode::from(2)
			} else {
				ExitCode::FAILURE
			}
		}
	}
}

fn run() -> Result<ExitCode> {
	let matches = Cli::command().get_matches();
	let cli = match Cli::from_arg_matches(&matches) {
		Ok(cli) => cli,
		Err(e) => e.exit(),
	};

	init_logging(cli.verbose);

	match cli.command {
		Commands::Create {
			output,
			no_config,
			list,
			source,
			..
		} => {
			let cli_rules = matches
				.subcommand_matches("create")
				.map(rules_in_command_line_order)
				.unwrap_or_default();
			handle_create(&source, cli_rules, output, no_config, list)
		}
		Commands::Apply {
			check,
			patch,
			destination,
		} => handle_apply(&patch, &destination, check),
		Commands::Config { action } => match action {
			ConfigAction::Show { dir } => handle_config_show(&dir),
			ConfigAction::Validate { dir } => handle_config_validate(&dir),
		},
	}
}

fn init_logging(verbose: bool) {
	let filter = if verbose {
		EnvFilter::new("treepatch=debug")
	} else {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("treepatch=warn"))
	};

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_target(false)
		.try_init();
}

fn is_nothing_matched(error: &anyhow::Error) -> bool {
	error.chain().any(|cause| {
		matches!(
			cause.downcast_ref::<TreePatchError>(),
			Some(TreePatchError::NothingMatched { .. })
		)
	})
}

/// Rebuild the interleaved `--include`/`--exclude` sequence from argument indices.
fn rules_in_command_line_order(matches: &ArgMatches) -> Vec<Rule> {
	let mut indexed: Vec<(usize, Rule)> = Vec::new();

	for kind in [RuleKind::Include, RuleKind::Exclude] {
		let id = kind.as_str();
		if let (Some(values), Some(indices)) =
			(matches.get_many::<String>(id), matches.indices_of(id))
		{
			indexed.extend(indices.zip(values.map(|pattern| Rule {
				kind,
				pattern: pattern.clone(),
			})));
		}
	}

	indexed.sort_by_key(|(index, _)| *index);
	indexed.into_iter().map(|(_, rule)| rule).collect()
}

fn handle_create(
	source: &Path,
	cli_rules: Vec<Rule>,
	output: Option<PathBuf>,
	no_config: bool,
	list: bool,
) -> Result<ExitCode> {
	let config = if no_config {
		MergedConfig::default()
	} else {
		load_merged_config(source).context("Failed to load configuration")?
	};

	let mut rules = cli_rules;
	rules.extend(config.rules.into_iter().map(|r| r.rule));
	if rules.is_empty() {
		debug!("no selection rules given, including every file");
		rules.push(Rule::include("**"));
	}
	let rule_set = RuleSet::compile(&rules)?;

	let output = output
		.or(config.output)
		.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
	let to_stdout = output == Path::new("-");

	let selected = if to_stdout {
		select::select(source, &rule_set)?
	} else {
		select::select(source, &SkipPath::new(&rule_set, source, &output))?
	};

	if list {
		for path in &selected {
			println!("{path}");
		}
		return Ok(ExitCode::SUCCESS);
	}

	let snapshot = snapshot::build(&selected, source)?;
	let document = encode(&snapshot);

	if to_stdout {
		let mut stdout = io::stdout().lock();
		stdout
			.write_all(document.as_bytes())
			.and_then(|()| stdout.flush())
			.context("Failed to write patch document to stdout")?;
	} else {
		write_document(&document, &output)?;
		println!(
			"Wrote {} to {}",
			count_files(snapshot.len()),
			output.display()
		);
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_apply(patch: &Path, destination: &Path, check: bool) -> Result<ExitCode> {
	let document = if patch == Path::new("-") {
		let mut bytes = Vec::new();
		io::stdin()
			.read_to_end(&mut bytes)
			.context("Failed to read patch document from stdin")?;
		PatchDocument::from_bytes(bytes)
	} else {
		PatchDocument::read(patch)?
	};

	let records = decode(&document)?;

	if check {
		for target in apply::plan(&records, destination)? {
			println!("{}", target.display());
		}
		println!(
			"Would apply {} to {}",
			count_files(records.len()),
			destination.display()
		);
		return Ok(ExitCode::SUCCESS);
	}

	let written = apply::apply(&records, destination)?;
	println!(
		"Applied {} to {}",
		count_files(written),
		destination.display()
	);
	Ok(ExitCode::SUCCESS)
}

fn count_files(n: usize) -> String {
	if n == 1 {
		"1 file".to_string()
	} else {
		format!("{n} files")
	}
}

fn handle_config_show(dir: &Path) -> Result<ExitCode> {
	let configs = discover_configs(dir).context("Failed to discover config files")?;

	if configs.is_empty() {
		println!("No configuration files found.");
	} else {
		println!("Configuration files (in cascade order):\n");

		for loaded in &configs {
			println!("# Source: {}", loaded.path.display());
			println!("# root: {}", loaded.config.root);
			if let Some(ref output) = loaded.config.output {
				println!("# output: {}", output.display());
			}
			println!("# rules: {}", loaded.config.rules.len());

			for entry in &loaded.config.rules {
				if let Some(rule) = entry.to_rule() {
					println!("  {} {}", rule.kind.as_str(), rule.pattern);
				}
			}
			println!();
		}
	}

	// Show user config path
	if let Ok(user_path) = user_config_path() {
		println!("User config path: {}", user_path.display());
		if user_path.exists() {
			println!("  (exists)");
		} else {
			println!("  (not found)");
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_config_validate(dir: &Path) -> Result<ExitCode> {
	let checked = discover_configs(dir).and_then(|configs| {
		for loaded in &configs {
			let rules: Vec<Rule> = loaded
				.config
				.rules
				.iter()
				.filter_map(|entry| entry.to_rule())
				.collect();
			RuleSet::compile(&rules)?;
		}
		Ok(configs)
	});

	match checked {
		Ok(configs) => {
			if configs.is_empty() {
				println!("No configuration files found.");
			} else {
				println!("All configuration files are valid:");
				for loaded in &configs {
					println!(
						"  {} ({} rules)",
						loaded.path.display(),
						loaded.config.rules.len()
					);
				}
			}
			Ok(ExitCode::SUCCESS)
		}
		Err(e) => {
			eprintln!("Configuration error: {e}");
			Ok(ExitCode::FAILURE)
		}
	}
}
