#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {{
        print!($($arg)*);
        stdout().flush()?;
    }};
}

#[macro_export]
macro_rules! status {
    ($code:expr) => {{
        let ret = $code;
        match &ret {
            Ok(_) => println!("{}", "ok".green()),
            Err(_) => println!("{}", "failed".red()),
        }
        ret
    }};
}

#[macro_export]
macro_rules! y_n {
    ($label:literal, $value:expr) => {{
        println!(
            "{}: {}",
            $label,
            if $value { "yes".yellow() } else { "no".green() }
        );
    }};
}
