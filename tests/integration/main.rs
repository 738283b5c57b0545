//! Integration tests for Knit

use std::fs;
use std::path::Path;

/// Write `content` to `root/rel`, creating parent directories
fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

mod cli_tests {
    use super::write;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn knit() -> Command {
        cargo_bin_cmd!("knit")
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.js", "module.exports = require('./one');");
        write(temp.path(), "one.js", "module.exports = 'one';");
        temp
    }

    #[test]
    fn help_displays() {
        knit()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage: knit"));
    }

    #[test]
    fn version_displays() {
        knit()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("knit"));
    }

    #[test]
    fn build_writes_artifact() {
        let temp = project();
        knit()
            .current_dir(temp.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote"));

        let code = std::fs::read_to_string(temp.path().join("build/index.js")).unwrap();
        assert!(code.contains(r#""one.js": [function(require, module, exports) {"#));
    }

    #[test]
    fn build_to_stdout() {
        let temp = project();
        knit()
            .args(["build", "index.js", "--stdout"])
            .current_dir(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::starts_with("(function outer("));
        assert!(!temp.path().join("build").exists());
    }

    #[test]
    fn build_from_stdin() {
        let temp = TempDir::new().unwrap();
        knit()
            .args(["build", "-", "--type", "css", "--stdout"])
            .current_dir(temp.path())
            .write_stdin("a { color: red; }\n")
            .assert()
            .success()
            .stdout("a { color: red; }\n");
    }

    #[test]
    fn missing_entry_fails() {
        let temp = TempDir::new().unwrap();
        knit()
            .args(["build", "zomg.js"])
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot find entry: zomg.js"));
    }

    #[test]
    fn unresolved_require_fails() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "index.js", "require('./missing');");
        knit()
            .args(["build", "--no-cache"])
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("./missing"));
    }

    #[test]
    fn install_prints_mapping() {
        let temp = project();
        write(temp.path(), "mirror/component/type/1.0.0/index.js", "module.exports = 'type';");
        write(temp.path(), "index.js", "require('component/type@1.0.0');");

        knit()
            .args(["install", "--mirror", "mirror", "--format", "json"])
            .current_dir(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("components/component-type@1.0.0/index.js"));
        assert!(temp.path().join("components/component-type@1.0.0/index.js").is_file());
    }

    #[test]
    fn cache_mapping_and_clean() {
        let temp = project();
        knit().arg("build").current_dir(temp.path()).assert().success();

        knit()
            .args(["cache", "mapping"])
            .current_dir(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("\"index.js\""));

        knit()
            .args(["cache", "clean"])
            .current_dir(temp.path())
            .assert()
            .success();
        assert!(!temp.path().join("components").exists());

        knit()
            .args(["cache", "mapping"])
            .current_dir(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached files"));
    }

    #[test]
    fn config_file_sets_directories() {
        let temp = project();
        write(temp.path(), "knit.toml", "build_to = \"dist\"\n");
        knit().arg("build").current_dir(temp.path()).assert().success();
        assert!(temp.path().join("dist/index.js").is_file());
    }

    #[test]
    fn invalid_config_fails() {
        let temp = project();
        write(temp.path(), "knit.toml", "concurrency = \"many\"\n");
        knit()
            .arg("build")
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("knit.toml"));
    }
}

mod api_tests {
    use super::write;
    use async_trait::async_trait;
    use knit::install::{MirrorTransport, Transport};
    use knit::transform::{alt_fn, sync_fn};
    use knit::{Knit, KnitError, KnitResult};
    use std::io::Write;
    use std::path::Path;
    use std::process::{Command, Stdio};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A project with a mirror serving `component/type`, `component/emitter`
    /// and `necolas/normalize.css`
    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for version in ["1.0.0", "1.1.0"] {
            write(
                root,
                &format!("mirror/component/type/{}/index.js", version),
                &format!("module.exports = function () {{ return '{}'; }};", version),
            );
        }
        write(root, "mirror/component/emitter/1.1.3/index.js", "module.exports = 'emitter';");
        write(
            root,
            "mirror/necolas/normalize.css/3.0.2/component.json",
            r#"{"styles": ["normalize.css"]}"#,
        );
        write(
            root,
            "mirror/necolas/normalize.css/3.0.2/normalize.css",
            "html { font-family: sans-serif; }\n",
        );
        temp
    }

    fn build(temp: &TempDir, entry: &str) -> Knit {
        let mut knit = Knit::new(temp.path()).unwrap();
        knit.entry(entry)
            .set_transport(Arc::new(MirrorTransport::new(temp.path().join("mirror"))));
        knit
    }

    #[tokio::test]
    async fn repeated_builds_are_identical() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = require('component/type@1.0.0');");

        let a = build(&temp, "index.js").run().await.unwrap();
        let b = build(&temp, "index.js").run().await.unwrap();
        write(temp.path(), "index.js", "module.exports = require('component/type@1.0.0');");
        let c = build(&temp, "index.js").run().await.unwrap();

        assert!(!a.code.is_empty());
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test]
    async fn edits_invalidate_the_cache() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 'a';");
        let a = build(&temp, "index.js").run().await.unwrap();
        write(temp.path(), "index.js", "module.exports = 'b';");
        let b = build(&temp, "index.js").run().await.unwrap();
        assert!(a.code.contains("'a'"));
        assert!(b.code.contains("'b'"));
    }

    #[tokio::test]
    async fn manifest_dependencies_resolve_by_repo_name() {
        let temp = project();
        write(
            temp.path(),
            "component.json",
            r#"{"dependencies": {"component/type": "~1.0.0"}}"#,
        );
        write(temp.path(), "index.js", "module.exports = require('type');");

        let knit = build(&temp, "index.js");
        let mapping = knit.install().await.unwrap();
        assert_eq!(
            mapping["index.js"].deps["type"],
            "components/component-type@1.0.0/index.js"
        );
    }

    #[tokio::test]
    async fn multiple_versions_live_side_by_side() {
        let temp = project();
        write(
            temp.path(),
            "index.js",
            "require('component/type@1.0.0'); require('component/type@1.1.0');",
        );
        let knit = build(&temp, "index.js");
        let artifact = knit.run().await.unwrap();
        assert!(artifact.code.contains("return '1.0.0'"));
        assert!(artifact.code.contains("return '1.1.0'"));
        assert!(temp.path().join("components/component-type@1.0.0").is_dir());
        assert!(temp.path().join("components/component-type@1.1.0").is_dir());
    }

    #[tokio::test]
    async fn mapping_contains_keys_from_all_instances() {
        let temp = project();
        write(temp.path(), "index.js", "require('component/type@1.0.0'); require('component/emitter@1.1.3');");
        write(temp.path(), "index.css", "@import 'necolas/normalize.css@3.0.2';\n");

        let a = build(&temp, "index.css");
        let b = build(&temp, "index.js");
        let (ra, rb) = tokio::join!(a.run(), b.run());
        ra.unwrap();
        rb.unwrap();

        let mapping = a.mapping().await.unwrap();
        let keys: Vec<_> = mapping.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "components/component-emitter@1.1.3/index.js",
                "components/component-type@1.0.0/index.js",
                "components/necolas-normalize.css@3.0.2/normalize.css",
                "index.css",
                "index.js",
            ]
        );
        assert!(mapping["index.css"].entry);
        assert!(mapping["index.js"].entry);
        assert!(!mapping["components/component-type@1.0.0/index.js"].entry);
    }

    #[tokio::test]
    async fn disabled_cache_has_an_empty_mapping() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 1;");
        let mut knit = build(&temp, "index.js");
        knit.set_cache(false);
        knit.run().await.unwrap();
        assert!(knit.mapping().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn css_with_remote_import_and_local_asset() {
        let temp = project();
        write(
            temp.path(),
            "index.css",
            "@import 'necolas/normalize.css@3.0.2';\n.logo { background: url('./images/logo.png'); }\n",
        );
        write(temp.path(), "images/logo.png", "png");

        let artifact = build(&temp, "index.css").run().await.unwrap();
        assert_eq!(artifact.kind, "css");
        assert_eq!(
            artifact.code,
            "html { font-family: sans-serif; }\n.logo { background: url('images/logo.png'); }\n"
        );
        let asset = temp.path().join("build/images/logo.png");
        assert_eq!(std::fs::read_to_string(&asset).unwrap(), "png");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn assets_are_symlinked_unless_copied() {
        let temp = project();
        write(temp.path(), "index.css", ".a { background: url(duo.png); }\n");
        write(temp.path(), "duo.png", "png");
        let asset = temp.path().join("build/duo.png");

        build(&temp, "index.css").run().await.unwrap();
        assert!(std::fs::symlink_metadata(&asset).unwrap().file_type().is_symlink());

        let mut knit = build(&temp, "index.css");
        knit.set_copy(true);
        knit.run().await.unwrap();
        assert!(!std::fs::symlink_metadata(&asset).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&asset).unwrap(), "png");
    }

    #[tokio::test]
    async fn json_dependencies_become_values() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = require('./data.json');");
        write(temp.path(), "data.json", "{\"a\": 1, \"b\": 2}\n");
        let artifact = build(&temp, "index.js").run().await.unwrap();
        assert!(artifact.code.contains("module.exports = {\"a\": 1, \"b\": 2};"));
    }

    #[tokio::test]
    async fn transforms_can_change_the_entry_kind() {
        let temp = project();
        write(temp.path(), "index.coffee", "module.exports = 'coffee'");
        let mut knit = build(&temp, "index.coffee");
        knit.use_plugin(sync_fn(|file, _| {
            if file.kind == "coffee" {
                file.kind = "js".into();
                file.src = format!("{};", file.src);
            }
            Ok(())
        }));
        let artifact = knit.run().await.unwrap();
        assert_eq!(artifact.kind, "js");

        knit.write(None).await.unwrap();
        assert!(temp.path().join("build/index.js").is_file());
    }

    #[tokio::test]
    async fn alternates_see_the_packed_artifact() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 1;");
        let mut knit = build(&temp, "index.js");
        knit.use_alternate(alt_fn(|artifact, _| {
            artifact.code = format!("/* banner */\n{}", artifact.code);
            Ok(())
        }));
        let artifact = knit.run().await.unwrap();
        assert!(artifact.code.starts_with("/* banner */\n(function outer("));
    }

    #[tokio::test]
    async fn global_name_is_emitted() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 'global module';");
        let mut knit = build(&temp, "index.js");
        knit.set_global("global-module");
        let artifact = knit.run().await.unwrap();
        assert!(artifact.code.ends_with(r#"["index.js"], "global-module");"#));
    }

    #[tokio::test]
    async fn write_places_external_source_maps_beside_the_output() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 1;");
        let mut knit = build(&temp, "index.js");
        knit.set_source_map(true);
        let artifact = knit.write(None).await.unwrap();

        assert!(artifact.code.contains("sourceMappingURL=index.js.map"));
        let map = std::fs::read_to_string(temp.path().join("build/index.js.map")).unwrap();
        let map: serde_json::Value = serde_json::from_str(&map).unwrap();
        assert_eq!(map["version"], 3);
        assert_eq!(map["sources"][0], "index.js");
    }

    #[tokio::test]
    async fn missing_remote_package_fails() {
        let temp = project();
        write(temp.path(), "index.js", "require('nope/nope');");
        let err = build(&temp, "index.js").run().await.unwrap_err();
        assert!(matches!(err, KnitError::Fetch { .. }));
        assert!(err.to_string().contains("nope/nope"));
    }

    #[tokio::test]
    async fn nested_stylesheets_reference_assets_relative_to_themselves() {
        let temp = project();
        write(
            temp.path(),
            "lib/inline.css",
            ".a { background: url(icon.png); }\n.b { background: url(images/logo.png); }\n",
        );
        write(temp.path(), "lib/icon.png", "icon");
        write(temp.path(), "lib/images/logo.png", "logo");

        let artifact = build(&temp, "lib/inline.css").write(None).await.unwrap();
        assert_eq!(
            artifact.code,
            ".a { background: url(icon.png); }\n.b { background: url(images/logo.png); }\n"
        );
        let build_dir = temp.path().join("build/lib");
        assert!(build_dir.join("inline.css").is_file());
        assert_eq!(std::fs::read_to_string(build_dir.join("icon.png")).unwrap(), "icon");
        assert_eq!(std::fs::read_to_string(build_dir.join("images/logo.png")).unwrap(), "logo");
    }

    /// Serves an untagged package and counts tag listings
    #[derive(Default)]
    struct UntaggedTransport {
        listings: AtomicUsize,
    }

    #[async_trait]
    impl Transport for UntaggedTransport {
        async fn versions(&self, _user: &str, _repo: &str) -> KnitResult<Vec<String>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn download(&self, _user: &str, _repo: &str, _r: &str, dest: &Path) -> KnitResult<()> {
            std::fs::write(dest.join("index.js"), "module.exports = 'untagged';").unwrap();
            Ok(())
        }

        fn name(&self) -> &'static str {
            "untagged"
        }
    }

    #[tokio::test]
    async fn untagged_packages_are_not_listed_again() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = require('u/r');");
        let transport = Arc::new(UntaggedTransport::default());

        for _ in 0..2 {
            let mut knit = Knit::new(temp.path()).unwrap();
            knit.entry("index.js").set_cache(false).set_transport(transport.clone());
            knit.run().await.unwrap();
        }
        assert!(temp.path().join("components/u-r@master/index.js").is_file());
        assert_eq!(transport.listings.load(Ordering::SeqCst), 1);
    }

    /// Evaluate a packed script under node and return `String(<expr>)`, where
    /// `req` is the artifact's require and `ctx` its global object. `None`
    /// when node isn't installed.
    fn evaluate(code: &str, expr: &str) -> Option<String> {
        let available = Command::new("node")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success());
        if !available {
            eprintln!("node not found, skipping evaluation");
            return None;
        }

        let script = format!(
            "const vm = require('vm');\
             const code = require('fs').readFileSync(0, 'utf8');\
             const ctx = vm.createContext({{}});\
             const req = vm.runInContext(code, ctx);\
             process.stdout.write(String({}));",
            expr
        );
        let mut child = Command::new("node")
            .arg("-e")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        child.stdin.take().unwrap().write_all(code.as_bytes()).unwrap();
        let out = child.wait_with_output().unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        Some(String::from_utf8(out.stdout).unwrap())
    }

    #[tokio::test]
    async fn packed_entry_exposes_both_exports() {
        let temp = project();
        write(
            temp.path(),
            "index.js",
            "module.exports = [require('./one'), require('./two')];",
        );
        write(temp.path(), "one.js", "module.exports = 'one';");
        write(temp.path(), "two.js", "module.exports = 'two';");

        let artifact = build(&temp, "index.js").run().await.unwrap();
        if let Some(out) = evaluate(&artifact.code, "JSON.stringify(req('index.js'))") {
            assert_eq!(out, r#"["one","two"]"#);
        }
    }

    #[tokio::test]
    async fn each_version_runs_its_own_code() {
        let temp = project();
        write(
            temp.path(),
            "index.js",
            "module.exports = [require('component/type@1.0.0')(), require('component/type@1.1.0')()];",
        );

        let artifact = build(&temp, "index.js").run().await.unwrap();
        if let Some(out) = evaluate(&artifact.code, "JSON.stringify(req('index.js'))") {
            assert_eq!(out, r#"["1.0.0","1.1.0"]"#);
        }
    }

    #[tokio::test]
    async fn global_export_is_set_on_the_context() {
        let temp = project();
        write(temp.path(), "index.js", "module.exports = 'global module';");
        let mut knit = build(&temp, "index.js");
        knit.set_global("global-module");

        let artifact = knit.run().await.unwrap();
        if let Some(out) = evaluate(&artifact.code, "ctx['global-module']") {
            assert_eq!(out, "global module");
        }
    }
}
