use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use search_migration_core::config::MigrationConfig;
use search_migration_core::scripts::discover_scripts;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const SCRIPTS_DIR: &str = "opensearch_migration";
const DIST_DIR: &str = "target/lambda-dist";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the search migration workspace",
    long_about = "Packages the migration and query Lambdas, checks migration\n\
                  scripts locally, and runs CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and package the Lambda binaries as `bootstrap` zip artifacts
    LambdaPackage {
        /// Compilation target triple for Lambda binaries
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Parse every migration script without contacting a cluster
    CheckScripts {
        /// Directory that `classpath:` locations resolve against
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Script locations; defaults to the deployed base + dev locations
        #[arg(long = "location")]
        locations: Vec<String>,
        /// Placeholder substitutions as name=value
        #[arg(long = "placeholder", default_value = "env=dev")]
        placeholders: Vec<String>,
    },
    /// Run CI checks (fmt, clippy, tests, script check)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Parse the bundled migration scripts
    Scripts,
    /// Run check + scripts
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_lambdas(target: &str, profile: BuildProfile) {
    ensure_rust_target_installed(target);

    step("Build lambda binaries");
    let mut cargo_args = vec![
        "build",
        "-p",
        "search_migration_lambda",
        "--target",
        target,
        "--bin",
        "migration_lambda",
        "--bin",
        "query_lambda",
    ];
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package lambda zip artifacts");
    let target_dir = Path::new("target").join(target).join(profile.dir_name());
    let dist_dir = Path::new(DIST_DIR);
    fs::create_dir_all(dist_dir).expect("failed to create lambda dist directory");

    let migration_zip = dist_dir.join("migration.zip");
    package_lambda_zip(
        &target_dir.join(binary_name("migration_lambda", target)),
        Some(Path::new(SCRIPTS_DIR)),
        &migration_zip,
    );

    let query_zip = dist_dir.join("query.zip");
    package_lambda_zip(
        &target_dir.join(binary_name("query_lambda", target)),
        None,
        &query_zip,
    );

    eprintln!(
        "\nPackaged artifacts:\n- {}\n- {}",
        migration_zip.display(),
        query_zip.display()
    );
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        );
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- lambda-package`"
        );
    }
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

/// Zip `binary_path` as `bootstrap`, plus every file under `scripts_dir`
/// (kept at the same relative path so `classpath:` locations resolve
/// against `LAMBDA_TASK_ROOT`).
fn package_lambda_zip(binary_path: &Path, scripts_dir: Option<&Path>, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected lambda binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read lambda binary");
    let file = fs::File::create(zip_path).expect("failed to create lambda zip");
    let mut zip = ZipWriter::new(file);
    let executable = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", executable)
        .expect("failed to start bootstrap entry in lambda zip");
    zip.write_all(&binary)
        .expect("failed to write bootstrap entry");

    if let Some(dir) = scripts_dir {
        let readable = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        let mut files = Vec::new();
        collect_files(dir, &mut files);
        files.sort();
        for path in files {
            let entry_name = path
                .to_str()
                .expect("script paths must be valid UTF-8")
                .replace('\\', "/");
            let contents = fs::read(&path).expect("failed to read migration script");
            zip.start_file(entry_name, readable)
                .expect("failed to start script entry in lambda zip");
            zip.write_all(&contents)
                .expect("failed to write script entry");
        }
    }

    zip.finish().expect("failed to finish lambda zip");
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        eprintln!("warning: '{}' not found; packaging without scripts", dir.display());
        return;
    };
    for entry in entries {
        let path = entry.expect("failed to read directory entry").path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}

fn check_scripts(root: &Path, locations: Vec<String>, placeholders: &[String]) {
    let mut config = MigrationConfig::default();
    if !locations.is_empty() {
        config.locations = locations;
    }
    config.placeholders = placeholders
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => {
                eprintln!("placeholder '{pair}' must look like name=value");
                exit(2);
            }
        })
        .collect();

    let scripts = match discover_scripts(&config.locations, root) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("error: {error}");
            exit(1);
        }
    };

    let mut failures = 0usize;
    for script in &scripts {
        match script.to_request(&config.placeholders) {
            Ok(request) => eprintln!(
                "ok   V{} {} {}",
                script.version,
                request.method.as_str(),
                request.path
            ),
            Err(error) => {
                failures += 1;
                eprintln!("FAIL {error}");
            }
        }
    }

    eprintln!("\n{} script(s), {failures} failure(s)", scripts.len());
    if failures > 0 {
        exit(1);
    }
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test search_migration_core");
    run_cargo(&["test", "-p", "search_migration_core"]);

    step("Test search_migration_lambda");
    run_cargo(&["test", "-p", "search_migration_lambda"]);
}

fn ci_scripts() {
    step("Check bundled migration scripts");
    check_scripts(Path::new("."), Vec::new(), &["env=dev".to_string()]);
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::LambdaPackage { target, profile } => {
            package_lambdas(&target, profile);
        }
        Commands::CheckScripts {
            root,
            locations,
            placeholders,
        } => {
            check_scripts(&root, locations, &placeholders);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Scripts => ci_scripts(),
                CiJob::All => {
                    ci_check();
                    ci_scripts();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
