//! 命令行参数转义。

/// POSIX shell 单引号转义。只含安全字符的参数原样返回。
pub(crate) fn shell(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:,+@%".contains(&b));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// HTCondor 提交文件中 `arguments` 的新式语法：整体用双引号包围，
/// 含空白的参数用单引号包围，引号字符自身重复一次。
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn condor(args: &[String]) -> String {
    let inner: Vec<String> = args
        .iter()
        .map(|a| {
            let escaped = a.replace('"', "\"\"").replace('\'', "''");
            if a.is_empty() || a.contains(char::is_whitespace) || a.contains('\'') {
                format!("'{escaped}'")
            } else {
                escaped
            }
        })
        .collect();
    format!("\"{}\"", inner.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell("defimgs"), "defimgs");
        assert_eq!(shell("/a/b.json"), "/a/b.json");
        assert_eq!(shell("a b"), "'a b'");
        assert_eq!(shell(""), "''");
        assert_eq!(shell("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_condor_quote() {
        let args = vec!["--age".to_string(), "36".to_string(), "a b".to_string()];
        assert_eq!(condor(&args), "\"--age 36 'a b'\"");
        assert_eq!(condor(&["say \"hi\"".to_string()]), "\"'say \"\"hi\"\"'\"");
    }
}
