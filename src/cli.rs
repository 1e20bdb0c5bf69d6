//! The command-line surface. Thin: argument parsing, output formatting and
//! exit-code mapping; every decision with behaviour lives in the member
//! crates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use honesty_checker::{ProblemKind, flags};
use honesty_deps::{DepWalker, IndexSource, print_deps, print_flat_deps};
use honesty_packaging::{Version, canonicalize_name};
use honesty_releases::{Package, parse_index};

use crate::api::download_many;
use crate::config::Config;
use crate::requirements::glob_requirement_names;

#[derive(Parser)]
#[command(name = "honesty", version, about = "Audit a Python package index")]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List releases and their files
    List {
        /// Package name, optionally `pkg==version`
        package: String,
        /// Use the simple HTML index instead of the JSON document
        #[arg(long)]
        html: bool,
    },
    /// Check that binary distributions match the source distribution
    Check {
        /// Package name, optionally `pkg==version` (default: newest)
        package: String,
    },
    /// Print the build backend declared by the sdist
    Ispep517 {
        package: String,
    },
    /// Report whether the wheel ships native modules
    Native {
        package: String,
    },
    /// Walk the transitive dependency graph of requirements
    Deps {
        /// Requirement strings (`name[extras]spec`)
        reqs: Vec<String>,
        /// Comma-separated glob patterns of requirements files to add
        #[arg(long)]
        requirements: Option<String>,
        /// Interpreter version to resolve against
        #[arg(long, default_value = "3.10.0")]
        python_version: String,
        /// linux, darwin or win32
        #[arg(long)]
        sys_platform: Option<String>,
        /// Ignore releases first uploaded after this RFC 3339 timestamp
        #[arg(long)]
        trim_newer: Option<String>,
        /// Follow extra-gated dependencies unconditionally
        #[arg(long)]
        include_extras: bool,
        /// Postorder flat list instead of a tree
        #[arg(long)]
        flat: bool,
        /// Use the simple HTML index instead of the JSON document
        #[arg(long)]
        html: bool,
        /// Treat `pkg==version` as already installed (repeatable)
        #[arg(long)]
        have: Vec<String>,
    },
    /// Download sdists into a directory (or just prime the cache)
    Download {
        package: String,
        /// Versions to fetch (default: newest)
        versions: Vec<String>,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

/// Parse args, run, and map the outcome to the exit-code bitmask.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: {err}");
            return flags::FATAL as i32;
        }
    };
    match runtime.block_on(dispatch(cli.command)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            flags::FATAL as i32
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("honesty=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(command: Command) -> Result<i32> {
    let config = Config::from_env();
    let cache = config.cache()?;
    let extraction = config.extraction();

    match command {
        Command::List { package, html } => {
            let (name, version) = split_version_spec(&package)?;
            let parsed = parse_index(&name, &cache, !html, false).await?;
            for release in parsed.releases.values() {
                if let Some(only) = &version {
                    if release.parsed_version != *only {
                        continue;
                    }
                }
                let yanked = if release.yanked { " (yanked)" } else { "" };
                println!("{}{yanked}:", release.version);
                for file in &release.files {
                    println!("  {} ({})", file.basename, file.file_type.tag());
                }
            }
            Ok(0)
        }

        Command::Check { package } => {
            let (name, version) = split_version_spec(&package)?;
            let parsed = parse_index(&name, &cache, true, false).await?;
            let version = pick_version(&parsed, version)?;
            let result = honesty_checker::run_checker(&parsed, &version, &cache, &extraction)
                .await?;
            for problem in &result.problems {
                let what = match problem.kind {
                    ProblemKind::NotInSdist => "not in sdist",
                    ProblemKind::DifferentHashes => "different hashes",
                };
                println!("  {} {what} ({})", problem.path, problem.artifacts.join(", "));
            }
            if result.flags & flags::NO_SDIST != 0 {
                println!("{name} {version} no sdist");
            } else if result.is_ok() {
                println!("{name} {version} OK");
            } else {
                println!("{name} {version} problems");
            }
            Ok(result.flags as i32)
        }

        Command::Ispep517 { package } => {
            let (name, version) = split_version_spec(&package)?;
            let parsed = parse_index(&name, &cache, true, false).await?;
            let version = pick_version(&parsed, version)?;
            let backend =
                honesty_checker::build_backend(&parsed, &version, &cache, &extraction).await?;
            println!("{backend}");
            Ok(0)
        }

        Command::Native { package } => {
            let (name, version) = split_version_spec(&package)?;
            let parsed = parse_index(&name, &cache, true, false).await?;
            let version = pick_version(&parsed, version)?;
            let native =
                honesty_checker::has_native_code(&parsed, &version, &cache, &extraction).await?;
            println!("{}", if native { "native" } else { "pure" });
            Ok(0)
        }

        Command::Deps {
            mut reqs,
            requirements,
            python_version,
            sys_platform,
            trim_newer,
            include_extras,
            flat,
            html,
            have,
        } => {
            if let Some(patterns) = requirements {
                reqs.extend(glob_requirement_names(&patterns)?);
            }
            if reqs.is_empty() {
                bail!("no requirements given");
            }
            let trim_newer = trim_newer
                .map(|stamp| {
                    DateTime::parse_from_rfc3339(&stamp)
                        .map(|parsed| parsed.with_timezone(&Utc))
                        .with_context(|| format!("bad --trim-newer timestamp {stamp:?}"))
                })
                .transpose()?;

            let installed: HashMap<String, String> = have
                .iter()
                .map(|pin| {
                    pin.split_once("==")
                        .map(|(name, version)| {
                            (canonicalize_name(name), version.to_string())
                        })
                        .with_context(|| format!("--have takes pkg==version, got {pin:?}"))
                })
                .collect::<Result<_>>()?;

            let source = Arc::new(IndexSource::new(cache.clone(), !html));
            let walker = DepWalker::with_parallelism(
                cache,
                source,
                &python_version,
                sys_platform.as_deref(),
                trim_newer,
                config.parallelism,
            )?;
            let walk = walker
                .walk(
                    &reqs,
                    include_extras,
                    Some(Box::new(move |name: &str| {
                        installed.get(name).cloned()
                    })),
                )
                .await?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if flat {
                print_flat_deps(&walk, &mut out)?;
            } else {
                print_deps(&walk, &mut out)?;
            }
            for name in &walk.known_conflicts {
                eprintln!("warning: multiple versions demanded for {name}");
            }
            Ok(0)
        }

        Command::Download {
            package,
            versions,
            dest,
        } => {
            let (name, version) = split_version_spec(&package)?;
            let parsed = parse_index(&name, &cache, true, false).await?;
            let versions = if versions.is_empty() {
                vec![pick_version(&parsed, version)?]
            } else {
                versions
                    .iter()
                    .map(|v| {
                        Version::parse(v).with_context(|| format!("bad version {v:?}"))
                    })
                    .collect::<Result<_>>()?
            };
            download_many(&parsed, &versions, dest.as_deref(), &cache).await
        }
    }
}

/// Split `pkg==1.2` into a canonical name and an optional pinned version.
fn split_version_spec(input: &str) -> Result<(String, Option<Version>)> {
    match input.split_once("==") {
        Some((name, version)) => {
            let version =
                Version::parse(version).with_context(|| format!("bad version {version:?}"))?;
            Ok((canonicalize_name(name), Some(version)))
        }
        None => Ok((canonicalize_name(input), None)),
    }
}

/// The pinned version, or the newest release.
fn pick_version(package: &Package, pinned: Option<Version>) -> Result<Version> {
    match pinned {
        Some(version) => Ok(version),
        None => package
            .releases
            .keys()
            .next_back()
            .cloned()
            .with_context(|| format!("{} has no releases", package.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_version_spec() {
        let (name, version) = split_version_spec("Requests==2.22.0").unwrap();
        assert_eq!("requests", name);
        assert_eq!(Some(Version::parse("2.22.0").unwrap()), version);

        let (name, version) = split_version_spec("zope.interface").unwrap();
        assert_eq!("zope-interface", name);
        assert_eq!(None, version);

        assert!(split_version_spec("pkg==not-a-version").is_err());
    }

    #[test]
    fn test_pick_version_prefers_newest() {
        let mut package = Package::new("demo");
        for v in ["0.9", "0.20", "0.10"] {
            let version = Version::parse(v).unwrap();
            package.releases.insert(
                version.clone(),
                honesty_releases::PackageRelease::new(v, version),
            );
        }
        let picked = pick_version(&package, None).unwrap();
        assert_eq!(Version::parse("0.20").unwrap(), picked);
    }

    #[test]
    fn test_cli_parses() {
        Cli::parse_from(["honesty", "check", "requests"]);
        Cli::parse_from(["honesty", "list", "requests==2.22.0", "--html"]);
        Cli::parse_from([
            "honesty",
            "deps",
            "requests[security]>=2.0",
            "--python-version",
            "3.9.0",
            "--flat",
            "--have",
            "urllib3==1.25.8",
        ]);
        Cli::parse_from(["honesty", "download", "requests", "2.22.0", "--dest", "/tmp"]);
    }
}
