//! Bundled sample programs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    pub code: &'static str,
}

pub const SAMPLES: [Sample; 3] = [
    Sample {
        name: "hello",
        description: "prints Hello World!",
        code: HELLO,
    },
    Sample {
        name: "echo",
        description: "copies input to output until input ends",
        code: ECHO,
    },
    Sample {
        name: "counter",
        description: "counts to 65 in a loop and prints A",
        code: COUNTER,
    },
];

const HELLO: &str = "\
++++++++++              set cell 0 to 10
[                       loop ten times
    >+++++++            cell 1 gets 70
    >++++++++++         cell 2 gets 100
    >+++                cell 3 gets 30
    >+                  cell 4 gets 10
    <<<<-               count down
]
>++.                    H
>+.                     e
+++++++..               l l
+++.                    o
>++.                    space
<<+++++++++++++++.      W
>.                      o
+++.                    r
------.                 l
--------.               d
>+.                     !
>.                      newline
";

const ECHO: &str = "\
,                       read a byte
[                       until input ends
    .                   echo it
    ,                   read the next one
]
";

const COUNTER: &str = "\
++++++++++              set cell 0 to 10
[                       loop ten times
    >++++++             add 6 to cell 1
    <-                  count down
]
>+++++.                 cell 1 is 65 so print A
";

/// Look a sample up by name, ignoring case.
pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

/// Comma separated sample names, for usage and error messages.
pub fn names() -> String {
    SAMPLES.iter().map(|s| s.name).collect::<Vec<_>>().join(", ")
}
