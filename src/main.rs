//! The command-line calculator: flag handling, startup resource files,
//! the interactive prompt loop and SIGINT wiring.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use ratcalc::engine::Engine;
use ratcalc::value::ErrValue;

static INTERRUPT: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_sig: libc::c_int) {
    if let Some(flag) = INTERRUPT.get() {
        flag.store(true, Ordering::Relaxed);
    }
}

fn install_sigint(flag: Arc<AtomicBool>) {
    let _ = INTERRUPT.set(flag);
    // SAFETY: on_sigint only touches an atomic
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
}

#[derive(Default)]
struct Cli {
    exprs: Vec<String>,
    strings: Vec<String>,
    no_startup: bool,
    no_banner: bool,
    pipe_mode: bool,
    stay_interactive: bool,
    continue_on_error: bool,
    unbuffered: bool,
    allow_custom: bool,
    access_mode: Option<u8>,
}

fn usage() -> ! {
    println!(
        "usage: ratcalc [-cdhipqsuvC] [-m mode] [-e expr ...]\n\
         \n\
           -e        evaluate the remaining arguments as expressions\n\
           -q        do not run startup resource files\n\
           -d        suppress the banner\n\
           -p        pipe mode: no prompt, no line editing\n\
           -i        stay interactive after -e expressions\n\
           -c        continue after errors\n\
           -s        pass the remaining arguments as strings in argv\n\
           -u        unbuffered output\n\
           -v        print version and exit\n\
           -h        this help\n\
           -C        permit custom builtins\n\
           -m mode   file access mode bits (0..7)"
    );
    std::process::exit(0);
}

fn parse_args(args: Vec<String>) -> Cli {
    let mut cli = Cli::default();
    let mut it = args.into_iter();
    let mut rest_are_exprs = false;
    let mut rest_are_strings = false;
    while let Some(arg) = it.next() {
        if rest_are_exprs {
            cli.exprs.push(arg);
            continue;
        }
        if rest_are_strings {
            cli.strings.push(arg);
            continue;
        }
        match arg.as_str() {
            "-e" => rest_are_exprs = true,
            "-s" => rest_are_strings = true,
            "-q" => cli.no_startup = true,
            "-d" => cli.no_banner = true,
            "-p" => cli.pipe_mode = true,
            "-i" => cli.stay_interactive = true,
            "-c" => cli.continue_on_error = true,
            "-u" => cli.unbuffered = true,
            "-C" => cli.allow_custom = true,
            "-v" => {
                println!("ratcalc {}", ratcalc::VERSION);
                std::process::exit(0);
            }
            "-h" => usage(),
            "-m" => {
                let mode = it.next().unwrap_or_default();
                match mode.parse::<u8>() {
                    Ok(m) if m <= 7 => cli.access_mode = Some(m),
                    _ => {
                        eprintln!("ratcalc: bad -m mode '{}'", mode);
                        std::process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("ratcalc: unknown option '{}'", other);
                std::process::exit(1);
            }
        }
    }
    cli
}

fn report(e: &ErrValue) {
    match &e.msg {
        Some(m) => eprintln!("error {}: {}", e.code, m),
        None => eprintln!("error {}", e.code),
    }
}

fn load_startup(eng: &mut Engine) {
    let files = match std::env::var("RATCALCRC") {
        Ok(v) => v,
        Err(_) => return,
    };
    let path_dirs: Vec<String> = std::env::var("RATCALCPATH")
        .map(|p| p.split(':').map(|s| s.to_string()).collect())
        .unwrap_or_default();
    for name in files.split(':').filter(|s| !s.is_empty()) {
        let mut resolved = name.to_string();
        if !name.contains('/') {
            for dir in &path_dirs {
                let candidate = format!("{}/{}", dir, name);
                if std::path::Path::new(&candidate).exists() {
                    resolved = candidate;
                    break;
                }
            }
        }
        if let Err(e) = eng.load_file(&resolved) {
            report(&e);
        }
    }
}

/// Unbalanced braces or brackets mean the statement continues on the
/// next line. Strings and comments are skipped while counting.
fn needs_more(src: &str) -> bool {
    let b = src.as_bytes();
    let mut depth: i64 = 0;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'"' => {
                i += 1;
                while i < b.len() && b[i] != b'"' {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'#' => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'*' => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    depth > 0
}

fn repl(eng: &mut Engine, cli: &Cli) -> i32 {
    let tty = unsafe { libc::isatty(0) } != 0;
    let show_prompt = tty && !cli.pipe_mode;
    if show_prompt && !cli.no_banner {
        println!("ratcalc {} -- arbitrary precision calculator", ratcalc::VERSION);
    }
    eng.echo = true;
    let stdin = std::io::stdin();
    let mut pending = String::new();
    let mut status = 0;
    loop {
        if show_prompt {
            let p = if pending.is_empty() {
                eng.config.prompt.clone()
            } else {
                eng.config.more.clone()
            };
            print!("{}", p);
            let _ = std::io::stdout().flush();
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        pending.push_str(&line);
        if needs_more(&pending) {
            continue;
        }
        let src = std::mem::take(&mut pending);
        if src.trim().is_empty() {
            continue;
        }
        match eng.eval_str(&src) {
            Ok(_) => {}
            Err(e) => {
                report(&e);
                status = 1;
                if !tty && !cli.continue_on_error {
                    return 1;
                }
            }
        }
        if cli.unbuffered {
            let _ = std::io::stdout().flush();
        }
        if eng.quit_requested() {
            break;
        }
    }
    if tty {
        0
    } else {
        status
    }
}

fn main() {
    env_logger::init();
    let cli = parse_args(std::env::args().skip(1).collect());
    let mut eng = Engine::new();
    if let Some(m) = cli.access_mode {
        eng.files.set_access_mode(m);
    }
    // -C gates native extension builtins, which resolve outside this
    // binary; the flag is accepted so scripted invocations keep working
    let _ = cli.allow_custom;
    install_sigint(eng.interrupt_flag());

    if !cli.no_startup {
        load_startup(&mut eng);
    }

    if !cli.strings.is_empty() {
        let items: Vec<ratcalc::Value> = cli
            .strings
            .iter()
            .map(|s| ratcalc::Value::str_from(s))
            .collect();
        eng.set_global(
            "argv",
            ratcalc::Value::List(std::rc::Rc::new(ratcalc::list::List::from_vec(items))),
        );
    }

    let mut status = 0;
    if !cli.exprs.is_empty() {
        eng.echo = true;
        for expr in &cli.exprs {
            match eng.eval_str(expr) {
                Ok(_) => {}
                Err(e) => {
                    report(&e);
                    status = 1;
                    if !cli.continue_on_error {
                        std::process::exit(1);
                    }
                }
            }
            if eng.quit_requested() {
                std::process::exit(status);
            }
        }
        if !cli.stay_interactive {
            std::process::exit(status);
        }
    }

    status = repl(&mut eng, &cli).max(status);
    std::process::exit(status);
}
