//! Minimal text/JSON rendering for package listings, grounded on the
//! teacher's `output::json`/`output::text` split — one format per function,
//! picked by the caller based on `Cli::json`.

use feed_core::ServerPackage;

/// Print a set of packages as either a JSON array or a text table.
pub fn print_packages(packages: &[ServerPackage], json: bool) {
    if json {
        match serde_json::to_string_pretty(packages) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("failed to serialize packages: {err}"),
        }
        return;
    }

    if packages.is_empty() {
        println!("no packages found");
        return;
    }
    for pkg in packages {
        let flags = latest_flags_summary(pkg);
        println!("{} {}{}", pkg.id, pkg.version, flags);
    }
}

fn latest_flags_summary(pkg: &ServerPackage) -> String {
    let mut flags = Vec::new();
    if !pkg.listed {
        flags.push("unlisted");
    }
    if pkg.semver2_is_absolute_latest {
        flags.push("latest");
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" ({})", flags.join(", "))
    }
}
