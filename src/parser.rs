use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, space0},
    combinator::{eof, map, verify},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult,
};

#[inline]
fn header_name(input: &str) -> IResult<&str, &str> {
    delimited(
        char('%'),
        take_while1(|c| c != '%' && c != '\n'),
        pair(char('%'), char('\n')),
    )(input)
}

#[inline]
fn value_line(input: &str) -> IResult<&str, &str> {
    terminated(
        verify(take_while(|c| c != '\n'), |s: &str| !s.is_empty()),
        char('\n'),
    )(input)
}

#[inline]
fn block(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    pair(header_name, many0(value_line))(input)
}

/// Parse an index component file: a sequence of `%HEADER%` blocks, each
/// holding zero or more value lines and terminated by an empty line.
pub fn entry_blocks(input: &str) -> IResult<&str, Vec<(&str, Vec<&str>)>> {
    terminated(
        many0(preceded(take_while(|c| c == '\n'), block)),
        take_while(|c| c == '\n'),
    )(input)
}

#[inline]
fn pkginfo_key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '=' && c != '#')(input)
}

#[inline]
fn pkginfo_line(input: &str) -> IResult<&str, Option<(&str, &str)>> {
    alt((
        map(preceded(char('#'), take_while(|c| c != '\n')), |_| None),
        map(
            separated_pair(
                pkginfo_key,
                delimited(space0, char('='), space0),
                take_while(|c| c != '\n'),
            ),
            Some,
        ),
    ))(input)
}

/// Parse `.PKGINFO` contents into key/value pairs, in file order.
/// Repeated keys (dependency lists) stay repeated; comments are dropped.
pub fn pkginfo_entries(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    let (rest, lines) = terminated(
        many0(preceded(
            take_while(|c| c == '\n'),
            terminated(pkginfo_line, alt((tag("\n"), eof))),
        )),
        take_while(|c| c == '\n'),
    )(input)?;

    Ok((rest, lines.into_iter().flatten().collect()))
}

#[test]
fn test_header_name() {
    assert_eq!(header_name("%FILENAME%\nrest"), Ok(("rest", "FILENAME")));
    assert!(header_name("FILENAME\n").is_err());
    assert!(header_name("%%\n").is_err());
}

#[test]
fn test_scalar_block() {
    let test = "%NAME%\nzsync\n\n";
    assert_eq!(block(test), Ok(("\n", ("NAME", vec!["zsync"]))));
}

#[test]
fn test_list_block() {
    let test = "%DEPENDS%\nglibc\nzlib>=1.2\n\n%NEXT%\n";
    assert_eq!(
        block(test),
        Ok(("\n%NEXT%\n", ("DEPENDS", vec!["glibc", "zlib>=1.2"])))
    );
}

#[test]
fn test_entry_blocks() {
    let test = "%FILENAME%\nzsync-0.6.2-1-x86_64.pkg.tar.zst\n\n%NAME%\nzsync\n\n%DEPENDS%\n\n%CSIZE%\n2048\n\n";
    let (rest, blocks) = entry_blocks(test).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        blocks,
        vec![
            ("FILENAME", vec!["zsync-0.6.2-1-x86_64.pkg.tar.zst"]),
            ("NAME", vec!["zsync"]),
            ("DEPENDS", vec![]),
            ("CSIZE", vec!["2048"]),
        ]
    );
}

#[test]
fn test_pkginfo() {
    let test = "# Generated by makepkg\npkgname = zsync\npkgver = 0.6.2-1\npkgdesc = Partial file transfer\nsize = 256000\ndepend = glibc\ndepend = zlib\n";
    let (rest, entries) = pkginfo_entries(test).unwrap();
    assert!(rest.is_empty());
    assert_eq!(
        entries,
        vec![
            ("pkgname", "zsync"),
            ("pkgver", "0.6.2-1"),
            ("pkgdesc", "Partial file transfer"),
            ("size", "256000"),
            ("depend", "glibc"),
            ("depend", "zlib"),
        ]
    );
}

#[test]
fn test_pkginfo_no_trailing_newline() {
    let (rest, entries) = pkginfo_entries("pkgname = a\npkgver = 1-1").unwrap();
    assert!(rest.is_empty());
    assert_eq!(entries, vec![("pkgname", "a"), ("pkgver", "1-1")]);
}
