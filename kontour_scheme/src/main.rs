use clap::{Parser, ValueEnum};
use kontour::machine::{
    Aam, AamGlobalStore, ActorsAam, ConcreteMachine, ConcurrentAam, Free,
};
use kontour::value::{BoundedIntDomain, ConcreteDomain, TypeSetDomain};
use kontour::{
    Addr, Allocator, ClassicalAllocator, ConcreteTimestamp, KontourError, MachineConfig, Output,
    SemanticError, Timestamp, ValueDomain, ValueSensitiveAllocator, ZeroCfa,
    error::TIMEOUT_EXIT_CODE,
};
use kontour_scheme::{SchemeExp, SchemeSemantics};
use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MachineKind {
    #[value(name = "AAM", alias = "aam")]
    Aam,
    #[value(name = "AAMGlobalStore", alias = "aam-global-store")]
    AamGlobalStore,
    #[value(name = "Free", alias = "free")]
    Free,
    #[value(name = "ConcreteMachine", alias = "concrete-machine")]
    ConcreteMachine,
    #[value(name = "ConcurrentAAM", alias = "concurrent-aam")]
    ConcurrentAam,
    #[value(name = "ActorsAAM", alias = "actors-aam")]
    ActorsAam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LatticeKind {
    #[value(name = "Concrete", alias = "concrete")]
    Concrete,
    #[value(name = "ConcreteNew", alias = "concrete-new")]
    ConcreteNew,
    #[value(name = "TypeSet", alias = "type-set")]
    TypeSet,
    #[value(name = "BoundedInt", alias = "bounded-int")]
    BoundedInt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AddressKind {
    #[value(name = "Classical", alias = "classical")]
    Classical,
    #[value(name = "ValueSensitive", alias = "value-sensitive")]
    ValueSensitive,
}

/// Static analysis of higher-order, possibly concurrent programs with
/// abstracting abstract machines.
#[derive(Debug, Parser)]
#[command(name = "kontour", version, about)]
struct Args {
    /// Machine variant
    #[arg(short, long, value_enum, default_value = "AAM")]
    machine: MachineKind,
    /// Abstract value lattice
    #[arg(short, long, value_enum, default_value = "TypeSet")]
    lattice: LatticeKind,
    /// Force concrete execution (ConcreteMachine over the Concrete lattice)
    #[arg(short, long)]
    concrete: bool,
    /// Address allocation policy
    #[arg(short, long, value_enum, default_value = "Classical")]
    address: AddressKind,
    /// Program file; without it, programs are read from stdin line by line
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Write the state graph in DOT format
    #[arg(short, long)]
    dotfile: Option<PathBuf>,
    /// Wall-clock deadline in seconds
    #[arg(short, long)]
    timeout: Option<f64>,
    /// Bound for the bounded-integer lattice
    #[arg(short, long, default_value_t = 100)]
    bound: i64,
    /// Print the full inspection report after each run
    #[arg(short, long)]
    inspect: bool,
    /// Track abstract allocation counts (enables strong updates)
    #[arg(long)]
    counting: bool,
    /// Parallel driver workers
    #[arg(short, long, default_value_t = 1)]
    workers: usize,
}

/// Domain-erased result of one analysis run.
struct Report {
    final_values: Vec<String>,
    errors: Vec<SemanticError>,
    num_states: usize,
    time: Duration,
    timed_out: bool,
    dot: Option<String>,
    summary_json: String,
}

impl Report {
    fn from_output<V: kontour::LatticeValue>(output: Output<V>) -> Self {
        Report {
            final_values: output.final_values.iter().map(|v| v.to_string()).collect(),
            errors: output.errors.iter().cloned().collect(),
            num_states: output.num_states,
            time: output.time,
            timed_out: output.timed_out,
            summary_json: serde_json::to_string_pretty(&output.summary())
                .unwrap_or_else(|_| "{}".into()),
            dot: output.dot,
        }
    }
}

fn machine_config(args: &Args) -> MachineConfig {
    MachineConfig {
        timeout: args.timeout.map(Duration::from_secs_f64),
        workers: args.workers.max(1),
        build_graph: args.dotfile.is_some(),
        counting: args.counting,
        ..MachineConfig::default()
    }
}

fn analyse<A, D, AL, T>(
    domain: D,
    alloc: AL,
    machine: MachineKind,
    config: MachineConfig,
    source: &str,
) -> Result<Report, KontourError>
where
    A: kontour::Address,
    D: ValueDomain<SchemeExp, A> + 'static,
    AL: Allocator<SchemeExp, D::Value, T, Addr = A> + Send + Sync + 'static,
    T: Timestamp,
{
    let sem = SchemeSemantics::new(domain, alloc);
    let program = kontour::Semantics::parse(&sem, source)?;
    let output = match machine {
        MachineKind::Aam => Aam::new(sem, config).run(program),
        MachineKind::AamGlobalStore => AamGlobalStore::new(sem, config).run(program),
        MachineKind::Free => Free::new(sem, config).run(program),
        MachineKind::ConcreteMachine => ConcreteMachine::new(sem, config).run(program),
        MachineKind::ConcurrentAam => ConcurrentAam::new(sem, config).run(program),
        MachineKind::ActorsAam => ActorsAam::new(sem, config).run(program),
    };
    Ok(Report::from_output(output))
}

fn dispatch(args: &Args, source: &str) -> Result<Report, KontourError> {
    let config = machine_config(args);
    let machine = if args.concrete {
        MachineKind::ConcreteMachine
    } else {
        args.machine
    };
    let lattice = if args.concrete {
        LatticeKind::Concrete
    } else {
        args.lattice
    };

    if machine == MachineKind::ConcreteMachine {
        // concrete execution needs fresh timestamps and exact values
        if !matches!(lattice, LatticeKind::Concrete | LatticeKind::ConcreteNew) {
            return Err(KontourError::UnsupportedConfiguration(format!(
                "ConcreteMachine requires the Concrete lattice, not {lattice:?}"
            )));
        }
        return match args.address {
            AddressKind::Classical => analyse::<Addr<ConcreteTimestamp>, _, _, ConcreteTimestamp>(
                ConcreteDomain::concrete(),
                ClassicalAllocator,
                machine,
                config,
                source,
            ),
            AddressKind::ValueSensitive => {
                analyse::<Addr<ConcreteTimestamp>, _, _, ConcreteTimestamp>(
                    ConcreteDomain::concrete(),
                    ValueSensitiveAllocator,
                    machine,
                    config,
                    source,
                )
            }
        };
    }

    macro_rules! with_domain {
        ($domain:expr) => {
            match args.address {
                AddressKind::Classical => analyse::<Addr<ZeroCfa>, _, _, ZeroCfa>(
                    $domain,
                    ClassicalAllocator,
                    machine,
                    config,
                    source,
                ),
                AddressKind::ValueSensitive => analyse::<Addr<ZeroCfa>, _, _, ZeroCfa>(
                    $domain,
                    ValueSensitiveAllocator,
                    machine,
                    config,
                    source,
                ),
            }
        };
    }

    match lattice {
        LatticeKind::TypeSet => with_domain!(TypeSetDomain::type_set()),
        LatticeKind::Concrete | LatticeKind::ConcreteNew => {
            with_domain!(ConcreteDomain::concrete())
        }
        LatticeKind::BoundedInt => with_domain!(BoundedIntDomain::bounded(args.bound)),
    }
}

fn print_report(args: &Args, report: &Report) {
    if report.final_values.is_empty() {
        println!("no final values");
    } else {
        for v in &report.final_values {
            println!("{v}");
        }
    }
    println!(
        "{} states explored in {:?}{}",
        report.num_states,
        report.time,
        if report.timed_out { " (timed out)" } else { "" }
    );
    for e in &report.errors {
        match e.position() {
            Some(pos) => println!("reachable error at {pos}: {e}"),
            None => println!("reachable error: {e}"),
        }
    }
    if args.inspect {
        println!("{}", report.summary_json);
    }
}

fn write_dot(args: &Args, report: &Report) -> Result<(), KontourError> {
    if let (Some(path), Some(dot)) = (&args.dotfile, &report.dot) {
        std::fs::write(path, dot)?;
    }
    Ok(())
}

fn run_once(args: &Args, source: &str) -> Result<bool, KontourError> {
    let report = dispatch(args, source)?;
    print_report(args, &report);
    write_dot(args, &report)?;
    Ok(report.timed_out)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    match &args.file {
        Some(path) => {
            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    error!("cannot read {}: {e}", path.display());
                    return ExitCode::from(1);
                }
            };
            match run_once(&args, &source) {
                Ok(false) => ExitCode::SUCCESS,
                Ok(true) => ExitCode::from(TIMEOUT_EXIT_CODE),
                Err(e) => {
                    error!("{e}");
                    e.exit_code()
                }
            }
        }
        None => {
            // REPL: one program per line
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                let _ = std::io::stdout().flush();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break ExitCode::SUCCESS,
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Err(e) = run_once(&args, line) {
                            println!("error: {e}");
                        }
                    }
                    Err(e) => {
                        error!("stdin: {e}");
                        break ExitCode::from(1);
                    }
                }
            }
        }
    }
}
