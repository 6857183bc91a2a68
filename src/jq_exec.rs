//! `--jq-expr` pre-processing of input documents.
use anyhow::{anyhow, Context as _, Result};
use jaq_core::{load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

/// Runs `filter_src` over `input`; every output of the filter is one document.
pub fn run_jaq(filter_src: &str, input: &Value) -> Result<Vec<Value>> {
    let loader = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = load::Arena::default();
    let program = load::File { code: filter_src, path: () };

    let modules = loader.load(&arena, program).map_err(|errs| {
        let problems = errs.into_iter().map(|(_, err)| format!("{err:?}"));
        filter_error(filter_src, "does not parse", problems)
    })?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            let problems = errs
                .into_iter()
                .flat_map(|(_, undefined)| undefined)
                .map(|(name, kind)| format!("`{name}` is undefined ({kind:?})"));
            filter_error(filter_src, "does not compile", problems)
        })?;

    let inputs = RcIter::new(core::iter::empty());
    let mut it = filter.run((Ctx::new([], &inputs), Val::from(input.clone())));

    let mut out = Vec::new();
    while let Some(item) = it.next() {
        let v = item.map_err(|e| anyhow!("jq runtime error: {e:?}"))?;
        // Val displays as JSON text.
        let text = v.to_string();
        let value = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("jq produced a value that is not JSON: {text}"))?;
        out.push(value);
    }
    Ok(out)
}

fn filter_error(
    filter_src: &str,
    stage: &str,
    problems: impl Iterator<Item = String>,
) -> anyhow::Error {
    let problems: Vec<String> = problems.collect();
    anyhow!("jq filter `{filter_src}` {stage}: {}", problems.join("; "))
}
