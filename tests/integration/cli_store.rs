use dhtfs::cli::{Cli, CliContext, Commands};
use clap::Parser;
use tempfile::TempDir;

fn context(store: &TempDir) -> CliContext {
    let store_arg = store.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["dhtfs", "--store", &store_arg, "--log-level", "off", "sync"])
        .unwrap();
    CliContext::new(&cli).unwrap()
}

#[test]
fn state_persists_across_invocations() {
    let store = TempDir::new().unwrap();
    {
        let ctx = context(&store);
        ctx.execute(&Commands::Mkdir {
            path: "/docs/drafts".to_string(),
            parents: true,
        })
        .unwrap();
        ctx.execute(&Commands::Put {
            path: "/docs/drafts/plan.txt".to_string(),
            content: Some("ship it".to_string()),
            from: None,
        })
        .unwrap();
    }

    {
        let ctx = context(&store);
        let listing = ctx
            .execute(&Commands::Ls {
                path: "/docs".to_string(),
            })
            .unwrap();
        assert_eq!(listing, "drafts/");
    }

    let ctx = context(&store);
    let body = ctx
        .execute(&Commands::Cat {
            path: "/docs/drafts/plan.txt".to_string(),
        })
        .unwrap();
    assert_eq!(body, "ship it");
}

#[test]
fn recursive_remove_clears_subtree() {
    let store = TempDir::new().unwrap();
    {
        let ctx = context(&store);
        ctx.execute(&Commands::Mkdir {
            path: "/a/b".to_string(),
            parents: true,
        })
        .unwrap();
    }
    {
        let ctx = context(&store);
        ctx.execute(&Commands::Put {
            path: "/a/b/c.txt".to_string(),
            content: Some("x".to_string()),
            from: None,
        })
        .unwrap();
    }
    {
        let ctx = context(&store);
        assert!(ctx
            .execute(&Commands::Rm {
                path: "/a".to_string(),
                recursive: false,
            })
            .is_err());
    }
    {
        let ctx = context(&store);
        ctx.execute(&Commands::Rm {
            path: "/a".to_string(),
            recursive: true,
        })
        .unwrap();
    }
    let ctx = context(&store);
    assert_eq!(ctx.fs().readdir("/").unwrap(), Vec::<String>::new());
}
